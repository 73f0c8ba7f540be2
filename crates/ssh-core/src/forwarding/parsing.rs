use xssh_types::ForwardingRule;

/// Bind host used when a rule does not name one.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

const RULE_FORMS: &str = "rule must be [bind:]port:host:hostport, R:port:host:hostport, or D:[bind:]port";

/// Parse a forwarding rule from its text form.
///
/// Accepted forms:
/// - `port:host:hostport` and `bind:port:host:hostport` (local)
/// - `R:port:host:hostport` (remote; the server listens on `host:hostport`
///   and connections come back to `port` on this machine)
/// - `D:port` and `D:bind:port` (dynamic SOCKS5)
///
/// IPv6 hosts must be bracketed, e.g. `[::1]:8080:db:5432`.
pub fn parse_forwarding_rule(spec: &str) -> crate::SshResult<ForwardingRule> {
    let fields = split_colon_parts(spec);
    let tag = fields.first().map(|f| f.to_ascii_uppercase());
    match (tag.as_deref(), fields.len()) {
        (Some("D"), 2) => Ok(ForwardingRule::dynamic(DEFAULT_BIND_HOST, parse_port(&fields[1])?)),
        (Some("D"), 3) => Ok(ForwardingRule::dynamic(
            bind_host(&fields[1]),
            parse_port(&fields[2])?,
        )),
        (Some("R"), 4) => Ok(ForwardingRule::remote(
            DEFAULT_BIND_HOST,
            parse_port(&fields[1])?,
            target_host(&fields[2])?,
            parse_port(&fields[3])?,
        )),
        (Some("D" | "R"), _) => Err(crate::SshCoreError::invalid_forward(
            if tag.as_deref() == Some("D") { "dynamic" } else { "remote" },
            RULE_FORMS,
        )),
        (_, 3) => Ok(ForwardingRule::local(
            DEFAULT_BIND_HOST,
            parse_port(&fields[0])?,
            target_host(&fields[1])?,
            parse_port(&fields[2])?,
        )),
        (_, 4) => Ok(ForwardingRule::local(
            bind_host(&fields[0]),
            parse_port(&fields[1])?,
            target_host(&fields[2])?,
            parse_port(&fields[3])?,
        )),
        _ => Err(crate::SshCoreError::invalid_forward("local", RULE_FORMS)),
    }
}

fn parse_port(value: &str) -> crate::SshResult<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| crate::SshCoreError::InvalidPort(value.to_string()))
}

fn bind_host(value: &str) -> String {
    normalize_host(value).unwrap_or_else(|| DEFAULT_BIND_HOST.to_string())
}

fn target_host(value: &str) -> crate::SshResult<String> {
    normalize_host(value).ok_or_else(|| crate::SshCoreError::empty("target host"))
}

fn normalize_host(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    Some(inner.to_string())
}

/// Split on `:` outside of `[...]`, keeping empty fields so positions stay stable.
fn split_colon_parts(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0usize;
    for ch in input.trim().chars() {
        match ch {
            ':' if bracket_depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
#[path = "parsing_tests.rs"]
mod tests;
