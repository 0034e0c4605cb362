use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geoguessr_client::GeoGuessrClient;
use ggstats_common::{Config, SyncMode};
use ggstats_ledger::{Ledger, PgLedger};
use ggstats_sync::dispatcher::all_rounds;
use ggstats_sync::{EnrichmentDispatcher, HttpRoundEnricher, Orchestrator, SyncSettings};

#[derive(Parser)]
#[command(name = "sync", about = "Ingest duels from the GeoGuessr activity feed")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Skip round enrichment after ingesting
    #[arg(long, global = true)]
    no_enrich: bool,

    /// Walk and resolve, but write nothing
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Stop at the last sync watermark (default)
    Incremental,
    /// Stop at now minus N days
    Recent {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Walk the whole feed, up to the page cap
    Full,
    /// Re-dispatch enrichment for every stored round
    Enrich,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ggstats=info".parse()?)
                .add_directive("geoguessr_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Incremental);

    info!("GGStats sync starting...");

    let config = Config::sync_from_env();
    config.log_redacted();
    let settings = SyncSettings::from_config(&config);

    let ledger = PgLedger::connect(&config.database_url).await?;
    ledger.migrate().await?;
    let ledger: Arc<dyn Ledger> = Arc::new(ledger);

    let dispatcher = EnrichmentDispatcher::new(
        Arc::new(HttpRoundEnricher::new(config.ggstats_api_url.clone())),
        settings.enrich_delay,
    );

    let mode = match command {
        Command::Incremental => SyncMode::Incremental,
        Command::Recent { days } => SyncMode::Windowed { days },
        Command::Full => SyncMode::Full,
        Command::Enrich => {
            let rounds = all_rounds(ledger.as_ref()).await?;
            info!(rounds = rounds.len(), "Re-dispatching enrichment for stored rounds");
            if cli.dry_run {
                return Ok(());
            }
            let stats = dispatcher.dispatch(&rounds).await;
            info!(
                attempted = stats.attempted,
                succeeded = stats.succeeded,
                failed = stats.failed.len(),
                "Enrichment sweep complete"
            );
            return Ok(());
        }
    };

    let client = Arc::new(
        GeoGuessrClient::new(config.geoguessr_session.clone()).with_urls(
            config.geoguessr_api_url.clone(),
            config.geoguessr_game_server_url.clone(),
        ),
    );
    let orchestrator = Orchestrator::new(client.clone(), client, ledger, &settings);

    let mut outcome = if cli.dry_run {
        orchestrator.preview(mode).await?
    } else {
        orchestrator.run(mode).await?
    };

    if !cli.dry_run && !cli.no_enrich && !outcome.new_rounds.is_empty() {
        outcome.summary.enrichment = Some(dispatcher.dispatch(&outcome.new_rounds).await);
    }

    println!("{}", outcome.summary);
    if outcome.summary.partial {
        warn!("PARTIAL sync: page cap reached before the boundary, rerun with a higher FEED_MAX_PAGES");
    }

    Ok(())
}
