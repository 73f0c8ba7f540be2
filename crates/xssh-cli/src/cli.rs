use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use secrecy::SecretString;
use ssh_core::{config::TransportConfig, forwarding::parse_forwarding_rule};
use xssh_types::{ForwardingRule, Host, host::DEFAULT_SSH_PORT};

#[derive(Debug, Parser)]
#[command(name = "xssh", version, about = "Forward local, remote, and SOCKS5 traffic through an SSH host")]
pub struct ForwardArgs {
    /// Target host; supports optional [user@]host[:port] syntax
    #[arg(value_name = "TARGET")]
    target: String,
    /// Forwarding rule: [bind:]port:host:hostport, R:port:host:hostport, or D:[bind:]port (repeatable)
    #[arg(short = 'f', long = "forward", value_name = "RULE", action = ArgAction::Append, required = true)]
    forwards: Vec<String>,
    /// Override remote username (defaults to user@host or the current user)
    #[arg(short = 'l', long = "username", value_name = "USER", help_heading = "Auth Options")]
    username: Option<String>,
    /// Private key to use for public-key authentication
    #[arg(short = 'i', long = "identity", value_name = "KEY", help_heading = "Auth Options")]
    identity: Option<PathBuf>,
    /// Password, or passphrase for --identity (falls back to XSSH_PASSWORD)
    #[arg(long = "password", value_name = "PASSWORD", help_heading = "Auth Options")]
    password: Option<String>,
    /// Give up on connect and authentication after this many seconds
    #[arg(long = "connect-timeout", value_name = "SECONDS", default_value_t = 10)]
    connect_timeout: u64,
    /// Log per-session statistics every N seconds (0 disables)
    #[arg(long = "stats-interval", value_name = "SECONDS", default_value_t = 30)]
    stats_interval: u64,
    /// More log output (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Less log output (repeatable)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

impl ForwardArgs {
    /// Verbose count minus quiet count, clamped to `i8`.
    pub fn verbosity(&self) -> i8 {
        let level = i16::from(self.verbose) - i16::from(self.quiet);
        level.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8
    }
}

/// Everything a foreground run needs, resolved from arguments and environment.
#[derive(Debug)]
pub struct ForwardPlan {
    pub host: Host,
    pub rules: Vec<ForwardingRule>,
    pub credential: Option<SecretString>,
    pub transport: TransportConfig,
    /// `None` disables periodic statistics.
    pub stats_interval: Option<Duration>,
}

impl TryFrom<ForwardArgs> for ForwardPlan {
    type Error = anyhow::Error;

    fn try_from(args: ForwardArgs) -> Result<Self> {
        let ForwardArgs {
            target,
            forwards,
            username,
            identity,
            password,
            connect_timeout,
            stats_interval,
            verbose: _,
            quiet: _,
        } = args;

        let target = parse_target(&target)?;
        let username = username
            .or(target.inferred_username)
            .or_else(fallback_username)
            .ok_or_else(|| anyhow!("unable to determine username; use --username or user@host"))?;

        let rules = forwards
            .iter()
            .map(|spec| parse_forwarding_rule(spec).with_context(|| format!("invalid forwarding rule '{spec}'")))
            .collect::<Result<Vec<_>>>()?;

        if connect_timeout == 0 {
            bail!("--connect-timeout must be at least 1 second");
        }

        let credential = password
            .or_else(|| env::var("XSSH_PASSWORD").ok().filter(|value| !value.is_empty()))
            .map(SecretString::from);
        if identity.is_none() && credential.is_none() {
            bail!("no credentials: pass --identity KEY, --password, or set XSSH_PASSWORD");
        }

        let mut host = Host::new(target.host.clone(), target.host, username, target.port);
        host.identity_file = identity;

        Ok(ForwardPlan {
            host,
            rules,
            credential,
            transport: TransportConfig {
                connect_timeout: Duration::from_secs(connect_timeout),
                ..TransportConfig::default()
            },
            stats_interval: (stats_interval > 0).then(|| Duration::from_secs(stats_interval)),
        })
    }
}

struct TargetParts {
    host: String,
    port: u16,
    inferred_username: Option<String>,
}

fn parse_target(input: &str) -> Result<TargetParts> {
    let (username_part, host_part) = match input.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user.to_string()), host),
        Some(_) => bail!("empty username in target '{input}'"),
        None => (None, input),
    };

    let (host, port) = if host_part.starts_with('[') {
        parse_bracketed_host(host_part)?
    } else if let Some((host, port_str)) = host_part.rsplit_once(':') {
        let port = port_str.parse::<u16>().context("invalid port")?;
        (host.to_string(), port)
    } else {
        (host_part.to_string(), DEFAULT_SSH_PORT)
    };
    if host.is_empty() {
        bail!("missing host in target '{input}'");
    }

    Ok(TargetParts {
        host,
        port,
        inferred_username: username_part,
    })
}

fn parse_bracketed_host(input: &str) -> Result<(String, u16)> {
    if let Some((host, port)) = input.rsplit_once("]:") {
        let host = host.trim_start_matches('[');
        let port = port.parse::<u16>().context("invalid port")?;
        Ok((host.to_string(), port))
    } else {
        let host = input.trim_start_matches('[').trim_end_matches(']');
        Ok((host.to_string(), DEFAULT_SSH_PORT))
    }
}

fn fallback_username() -> Option<String> {
    for key in ["XSSH_USER", "USER", "LOGNAME"] {
        if let Ok(value) = env::var(key)
            && !value.is_empty()
        {
            return Some(value);
        }
    }
    let current = whoami::username();
    if current.is_empty() { None } else { Some(current) }
}
