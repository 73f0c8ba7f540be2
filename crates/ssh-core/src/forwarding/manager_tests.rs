//! Unit tests for forwarding manager.

use xssh_types::ForwardingRule;

use super::*;

#[test]
fn accepts_well_formed_rules() {
    validate_rule(&ForwardingRule::local("127.0.0.1", 0, "db", 5432)).unwrap();
    validate_rule(&ForwardingRule::remote("127.0.0.1", 8080, "", 9000)).unwrap();
    validate_rule(&ForwardingRule::dynamic("127.0.0.1", 1080)).unwrap();
}

#[test]
fn rejects_missing_fields() {
    let rule = ForwardingRule::local("127.0.0.1", 8080, "db", 5432).with_id(" ");
    assert!(matches!(validate_rule(&rule), Err(SshCoreError::EmptyValue { .. })));

    let rule = ForwardingRule::local("", 8080, "db", 5432);
    assert!(matches!(validate_rule(&rule), Err(SshCoreError::EmptyValue { .. })));

    let rule = ForwardingRule::local("127.0.0.1", 8080, "", 5432);
    assert!(matches!(validate_rule(&rule), Err(SshCoreError::EmptyValue { .. })));
}

#[test]
fn rejects_zero_target_ports() {
    let rule = ForwardingRule::local("127.0.0.1", 8080, "db", 0);
    assert!(matches!(validate_rule(&rule), Err(SshCoreError::InvalidForwardSpec { .. })));

    let rule = ForwardingRule::remote("127.0.0.1", 0, "", 9000);
    assert!(matches!(validate_rule(&rule), Err(SshCoreError::InvalidForwardSpec { .. })));
}
