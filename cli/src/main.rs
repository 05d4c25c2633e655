pub mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::Instrument;

use cli::*;
use common::logger::{TraceId, annotate_span, init_logger, root_span};
use session::{SessionRegistry, SqliteSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger("sessionctl", cli.json_logs);

    let trace_id = TraceId::default();
    let span = root_span("sessionctl", &trace_id);

    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli, |name| std::env::var(name).ok())?;
    annotate_span(&config.prefix, None);

    let store = SqliteSessionStore::connect(&cli.database_url)
        .await
        .context("failed to open session store")?;
    let registry = SessionRegistry::new(Arc::new(store), config)?;

    let outcome = execute(&registry, cli.command).await;
    registry.close().await?;
    outcome
}

async fn execute(
    registry: &SessionRegistry<SqliteSessionStore>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Register(args) => {
            let token = args.token.clone();
            annotate_span(registry.codec().prefix(), Some(&token));
            let stored = registry.register_session(&token, args.into_session()).await?;
            print_json(&stored)
        }
        Command::Get { token } => {
            annotate_span(registry.codec().prefix(), Some(&token));
            print_json(&registry.get_session_info(&token).await?)
        }
        Command::Delete { token } => {
            annotate_span(registry.codec().prefix(), Some(&token));
            let removed = registry.del_session_info(&token).await?;
            print_json(&serde_json::json!({ "token": token, "removed": removed }))
        }
        Command::Refresh { token } => {
            annotate_span(registry.codec().prefix(), Some(&token));
            print_json(&registry.refresh_session(&token).await?)
        }
        Command::List { filter, all } => {
            let sessions = if all {
                registry.list_all_sessions(move |s| filter.matches(s)).await?
            } else {
                registry
                    .list_registered_sessions(move |s| filter.matches(s))
                    .await?
            };
            print_json(&sessions)
        }
        Command::Sweep { filter, expired } => {
            let entries = if expired {
                registry.purge_expired().await?
            } else {
                registry.delete_sessions(move |s| filter.matches(s)).await?
            };
            print_json(&sweep_lines(&entries, registry.codec()))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
