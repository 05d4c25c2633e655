use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use session::{KeyCodec, RegistryConfig, Session, SweepEntry, SweepOutcome};

#[derive(Debug, Parser)]
#[clap(name = "sessionctl", version)]
pub struct Cli {
    /// SQLite database holding the session documents
    #[clap(long, env = "DATABASE_URL", default_value = "sqlite://sessions.db")]
    pub database_url: String,

    /// Key namespace (overrides SESSION_REGISTRY_PREFIX)
    #[clap(long)]
    pub prefix: Option<String>,

    /// Lease granted on register/refresh, in seconds (overrides SESSION_TTL_SECS)
    #[clap(long)]
    pub ttl_secs: Option<u64>,

    /// Emit logs as JSON lines on stderr
    #[clap(long)]
    pub json_logs: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new session; fails if the token is taken
    Register(RegisterArgs),
    /// Print one session
    Get { token: String },
    /// Delete one session (no-op if missing)
    Delete { token: String },
    /// Extend the lease of a live session
    Refresh { token: String },
    /// List sessions matching the filter
    List {
        #[clap(flatten)]
        filter: SessionFilter,
        /// Scan every namespace in the store, not just --prefix
        #[clap(long)]
        all: bool,
    },
    /// Delete sessions matching the filter
    Sweep {
        #[clap(flatten)]
        filter: SessionFilter,
        /// Only sweep sessions whose lease has passed
        #[clap(long, conflicts_with_all = ["lesson", "ip", "user_id"])]
        expired: bool,
    },
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[clap(long)]
    pub token: String,
    #[clap(long)]
    pub user_id: i64,
    #[clap(long)]
    pub ip: String,
    #[clap(long)]
    pub port: u16,
    #[clap(long)]
    pub lesson: String,
    #[clap(long)]
    pub container: String,
    /// Forward the full URL to the container
    #[clap(long)]
    pub full_url: bool,
}

impl RegisterArgs {
    pub fn into_session(self) -> Session {
        Session {
            user_id: self.user_id,
            token: self.token,
            need_full_url: self.full_url,
            ip_address: self.ip,
            port_listen: self.port,
            lesson_short_name: self.lesson,
            container_id: self.container,
            expires_at_ms: None,
        }
    }
}

/// Field filters combined with AND; an empty filter matches everything.
#[derive(Debug, Clone, Default, Args)]
pub struct SessionFilter {
    #[clap(long)]
    pub lesson: Option<String>,
    #[clap(long)]
    pub ip: Option<String>,
    #[clap(long)]
    pub user_id: Option<i64>,
}

impl SessionFilter {
    pub fn matches(&self, s: &Session) -> bool {
        self.lesson.as_ref().is_none_or(|l| *l == s.lesson_short_name)
            && self.ip.as_ref().is_none_or(|ip| *ip == s.ip_address)
            && self.user_id.is_none_or(|id| id == s.user_id)
    }
}

/// Registry configuration: command-line flags first, then the environment.
pub(crate) fn build_config<F>(cli: &Cli, env: F) -> anyhow::Result<RegistryConfig>
where
    F: Fn(&str) -> Option<String>,
{
    RegistryConfig::from_lookup(|name| match name {
        "SESSION_REGISTRY_PREFIX" => cli.prefix.clone().or_else(|| env(name)),
        "SESSION_TTL_SECS" => cli.ttl_secs.map(|s| s.to_string()).or_else(|| env(name)),
        _ => env(name),
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct SweepLine<'a> {
    key: &'a str,
    token: Option<&'a str>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One output line per swept key, with the token recovered from the key.
pub(crate) fn sweep_lines<'a>(entries: &'a [SweepEntry], codec: &KeyCodec) -> Vec<SweepLine<'a>> {
    entries
        .iter()
        .map(|e| {
            let (outcome, error) = match &e.outcome {
                SweepOutcome::Removed => ("removed", None),
                SweepOutcome::Retained => ("retained", None),
                SweepOutcome::Vanished => ("vanished", None),
                SweepOutcome::Failed(err) => ("failed", Some(err.to_string())),
            };
            SweepLine {
                key: &e.key,
                token: codec.logical_token(&e.key),
                outcome,
                error,
            }
        })
        .collect()
}
