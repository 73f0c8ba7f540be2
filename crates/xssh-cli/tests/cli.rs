use std::{env, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use secrecy::ExposeSecret;
use serial_test::serial;
use xssh_cli::cli::{ForwardArgs, ForwardPlan};
use xssh_types::ForwardType;

static ENV_GUARD: Mutex<()> = Mutex::new(());

#[test]
fn command_definition_is_consistent() {
    ForwardArgs::command().debug_assert();
}

#[test]
#[serial]
fn parses_target_and_mixed_rules() {
    let plan = parse_plan(&[
        "-f",
        "8080:internal.service:80",
        "--forward",
        "R:9000:db:5432",
        "-f",
        "D:[::1]:1080",
        "--password",
        "s3cret",
        "ops@bastion.example:2222",
    ])
    .expect("plan");

    assert_eq!(plan.host.user, "ops");
    assert_eq!(plan.host.address, "bastion.example");
    assert_eq!(plan.host.port, 2222);
    assert_eq!(plan.host.transport_key(), "ops@bastion.example:2222");
    assert_eq!(plan.credential.as_ref().map(|c| c.expose_secret().to_string()), Some("s3cret".into()));

    let kinds: Vec<_> = plan.rules.iter().map(|rule| rule.kind).collect();
    assert_eq!(kinds, vec![ForwardType::Local, ForwardType::Remote, ForwardType::Dynamic]);
    assert_eq!(plan.rules[0].remote_endpoint(), "internal.service:80");
    assert_eq!(plan.rules[1].local_port, 9000);
    assert_eq!(plan.rules[2].local_host, "::1");
}

#[test]
#[serial]
fn defaults_port_user_and_timeouts() {
    let plan = parse_plan(&["-f", "D:1080", "-i", "/keys/id_ed25519", "bastion"]).expect("plan");

    assert_eq!(plan.host.user, "cli-test");
    assert_eq!(plan.host.port, 22);
    assert_eq!(plan.host.identity_file, Some(PathBuf::from("/keys/id_ed25519")));
    assert!(plan.credential.is_none());
    assert_eq!(plan.transport.connect_timeout, Duration::from_secs(10));
    assert_eq!(plan.stats_interval, Some(Duration::from_secs(30)));
}

#[test]
#[serial]
fn password_falls_back_to_environment() {
    let plan = parse_plan_with_env(
        &["-f", "D:1080", "--stats-interval", "0", "--connect-timeout", "3", "[fe80::1]:2200"],
        &[("XSSH_PASSWORD", Some("from-env"))],
    )
    .expect("plan");

    assert_eq!(plan.host.address, "fe80::1");
    assert_eq!(plan.host.port, 2200);
    assert_eq!(plan.credential.as_ref().map(|c| c.expose_secret().to_string()), Some("from-env".into()));
    assert_eq!(plan.transport.connect_timeout, Duration::from_secs(3));
    assert!(plan.stats_interval.is_none());
}

#[test]
#[serial]
fn rejects_bad_input() {
    assert!(parse_plan(&["--password", "x", "bastion"]).is_err(), "a rule is required");
    assert!(parse_plan(&["-f", "8080:host", "--password", "x", "bastion"]).is_err());
    assert!(parse_plan(&["-f", "D:1080", "--password", "x", "bastion:notaport"]).is_err());
    assert!(parse_plan(&["-f", "D:1080", "bastion"]).is_err(), "credentials are required");
    assert!(parse_plan(&["-f", "D:1080", "--password", "x", "--connect-timeout", "0", "bastion"]).is_err());
}

#[test]
fn verbosity_counts_flags() -> Result<()> {
    let args = ForwardArgs::try_parse_from(["xssh", "-vv", "-f", "D:1080", "bastion"])?;
    assert_eq!(args.verbosity(), 2);
    let args = ForwardArgs::try_parse_from(["xssh", "-q", "-f", "D:1080", "bastion"])?;
    assert_eq!(args.verbosity(), -1);
    assert!(ForwardArgs::try_parse_from(["xssh", "-v", "-q", "-f", "D:1080", "bastion"]).is_err());
    Ok(())
}

fn parse_plan(args: &[&str]) -> Result<ForwardPlan> {
    parse_plan_with_env(args, &[])
}

fn parse_plan_with_env(args: &[&str], overrides: &[(&str, Option<&str>)]) -> Result<ForwardPlan> {
    with_clean_env(|| {
        for (key, value) in overrides {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }
        let mut argv = vec!["xssh"];
        argv.extend_from_slice(args);
        let cli = ForwardArgs::try_parse_from(&argv).map_err(|err| anyhow!(err.to_string()))?;
        ForwardPlan::try_from(cli)
    })
}

fn with_clean_env<T>(f: impl FnOnce() -> T) -> T {
    let guard = ENV_GUARD.lock().expect("env guard poisoned");
    let prev_user = env::var("XSSH_USER").ok();
    let prev_password = env::var("XSSH_PASSWORD").ok();
    unsafe {
        env::set_var("XSSH_USER", "cli-test");
        env::remove_var("XSSH_PASSWORD");
    }
    let result = f();
    match prev_user {
        Some(value) => unsafe { env::set_var("XSSH_USER", value) },
        None => unsafe { env::remove_var("XSSH_USER") },
    }
    match prev_password {
        Some(value) => unsafe { env::set_var("XSSH_PASSWORD", value) },
        None => unsafe { env::remove_var("XSSH_PASSWORD") },
    }
    drop(guard);
    result
}
