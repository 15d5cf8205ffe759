// riftpilot entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout belongs to the prompt)
// 2. Load config
// 3. Build the two control-plane connectors
// 4. Load the champion catalog (empty on failure)
// 5. Spawn the automation engine
// 6. Read operator commands from stdin until quit, EOF or Ctrl+C
// 7. Stop the engine between ticks and exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use riftpilot_app::catalog::{ChampionCatalog, DataDragon};
use riftpilot_app::commands::{self, CommandContext, CommandError, UserCommand};
use riftpilot_app::config::{self, SettingsHandle};
use riftpilot_app::engine::{AutomationEngine, EngineStatus};
use riftpilot_app::presence::{PresenceFlag, PresenceSequencer};
use riftpilot_core::client::Connector;
use riftpilot_core::locator::{LeagueClientLocator, RiotClientLocator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("riftpilot starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded from {}: accept={}, pick={}, ban={}",
        config.path.display(),
        config.automation.auto_accept,
        config.automation.auto_pick,
        config.automation.auto_ban
    );

    // 3. Connectors
    let timeout = config.network.request_timeout();
    let league = Arc::new(
        Connector::new(
            LeagueClientLocator::new(
                config.league_client.lockfile_paths.clone(),
                config.league_client.process_name.clone(),
            ),
            timeout,
        )
        .context("failed to build league client connector")?,
    );
    let riot_locator = RiotClientLocator::new(config.riot_client.lockfile.clone());
    match riot_locator.lockfile() {
        Some(path) => info!("Riot client lockfile: {}", path.display()),
        None => warn!("No local data directory; riot client presence steps will be skipped"),
    }
    let riot = Arc::new(
        Connector::new(riot_locator, timeout).context("failed to build riot client connector")?,
    );

    // 4. Champion catalog
    let catalog = match load_catalog(&config.catalog).await {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!("Champion catalog unavailable, auto pick/ban disabled this session: {e:#}");
            ChampionCatalog::default()
        }
    };
    let catalog = Arc::new(catalog);

    // 5. Engine
    let settings = SettingsHandle::new(config.automation.clone());
    let presence = PresenceFlag::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (status_tx, status_rx) = watch::channel(EngineStatus::default());

    let engine = AutomationEngine::new(
        league.clone(),
        settings.clone(),
        catalog.clone(),
        presence.clone(),
    )
    .with_interval(config.network.poll_interval());
    let engine_handle = tokio::spawn(engine.run(shutdown_rx, status_tx));

    let sequencer = PresenceSequencer::new(
        league.clone(),
        riot,
        presence,
        config.presence.offline_chat_url.clone(),
    );
    let ctx = CommandContext::new(
        league,
        sequencer,
        settings,
        catalog,
        status_rx,
        Some(config.path.clone()),
    );

    // 6. Command prompt
    println!("riftpilot ready. Type `help` for commands.");
    info!("Application ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read command: {e}");
                        break;
                    }
                };
                match commands::parse_command(&line) {
                    Ok(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Ok(command) => println!("{}", ctx.execute(command).await),
                    Err(CommandError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // 7. Cleanup: the engine notices shutdown after its current tick.
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;

    info!("riftpilot shut down cleanly");
    Ok(())
}

async fn load_catalog(config: &config::CatalogConfig) -> anyhow::Result<ChampionCatalog> {
    let source = DataDragon::new(config).context("failed to build catalog client")?;
    let catalog = source
        .fetch_catalog()
        .await
        .context("failed to fetch champion data")?;
    Ok(catalog)
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("riftpilot.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("riftpilot=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
