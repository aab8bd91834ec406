use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use commonware_macros::select;
use commonware_runtime::{tokio, Metrics, Runner};
use futures::{channel::mpsc, StreamExt};
use parlor_execution::{
    casino::RandomShoe, Disk, Engine, EngineConfig, Expiry, Ledger, Memory, State,
};
use parlor_node::{
    dispatcher::Dispatcher,
    identity::StaticIdentities,
    messenger::{Console, Messenger},
    Config, ValidatedConfig,
};
use parlor_types::execution::AccountId;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage partition holding the ledger snapshots.
const PARTITION: &str = "ledger";

enum Event {
    Line(std::io::Result<Option<String>>),
    Expiry(Option<Expiry>),
}

/// Split an input line of the form `<chat> <sender> <message>`.
fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let chat = parts.next().filter(|chat| !chat.is_empty())?;
    let sender = parts.next().filter(|sender| !sender.is_empty())?;
    let text = parts.next().unwrap_or("").trim();
    Some((chat, sender, text))
}

fn runtime_config(config: &ValidatedConfig) -> tokio::Config {
    let cfg = tokio::Config::default().with_worker_threads(config.worker_threads);
    match &config.data_dir {
        Some(dir) => cfg.with_storage_directory(dir.clone()),
        None => cfg,
    }
}

fn print_dry_run_report(config: &ValidatedConfig) {
    println!("dry-run report");
    println!("  log_level: {} json={}", config.log_level, config.json_logs);
    println!("  worker_threads: {}", config.worker_threads);
    match &config.data_dir {
        Some(path) => println!("  data_dir: {}", path.display()),
        None => println!("  data_dir: <memory>"),
    }
    println!(
        "  daily_amount: {} session_ttl: {:?}",
        config.daily_amount, config.session_ttl
    );
    println!(
        "  admins: {} aliases: {}",
        config.admins.len(),
        config.aliases.len()
    );
    println!("  refund_on_shutdown: {}", config.refund_on_shutdown);
}

async fn run<S: State + 'static>(
    context: tokio::Context,
    config: ValidatedConfig,
    store: S,
) -> Result<()> {
    let (engine, mut expiries) = Engine::new(
        context.with_label("engine"),
        Ledger::new(store),
        Box::new(RandomShoe::new(config.shoe_seed)),
        EngineConfig {
            session_ttl: config.session_ttl,
        },
    );
    let dispatcher = Dispatcher::new(
        engine.clone(),
        Arc::new(StaticIdentities::new(config.aliases.clone())),
        config.admins.clone(),
        config.daily_amount,
    );
    let messenger = Console::stdout();

    let stdin = ::tokio::io::stdin();
    let mut lines = ::tokio::io::AsyncBufReadExt::lines(::tokio::io::BufReader::new(stdin));
    info!("reading messages from stdin");
    loop {
        let event = select! {
            line = lines.next_line() => { Event::Line(line) },
            expiry = expiries.next() => { Event::Expiry(expiry) },
        };
        match event {
            Event::Line(line) => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                let Some((chat, sender, text)) = parse_line(&line) else {
                    continue;
                };
                let Some(sender) = AccountId::try_new(sender) else {
                    warn!(chat, len = sender.len(), "ignoring message from unusable sender id");
                    continue;
                };
                if let Some(reply) = dispatcher.handle(chat, &sender, text).await {
                    messenger.send(&reply)?;
                }
            }
            Event::Expiry(Some(expiry)) => {
                messenger.send(&dispatcher.expired(&expiry))?;
            }
            Event::Expiry(None) => break,
        }
    }

    if config.refund_on_shutdown {
        let refunded = engine.shutdown().await;
        info!(games = refunded.len(), "refunded open games");
        for (key, snapshot) in refunded {
            messenger.send(&dispatcher.expired(&Expiry { key, snapshot }))?;
        }
    } else if engine.active_sessions() > 0 {
        warn!(
            games = engine.active_sessions(),
            "shutting down with games in play, their wagers are not returned"
        );
    }
    drain(&mut expiries);
    Ok(())
}

/// Discard expiries that raced the shutdown.
fn drain(expiries: &mut mpsc::UnboundedReceiver<Expiry>) {
    while let Ok(Some(expiry)) = expiries.try_next() {
        info!(table = %expiry.key, "game expired during shutdown");
    }
}

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn main_result() -> Result<()> {
    // Parse arguments
    let matches = Command::new("parlor")
        .about("Chat ledger and blackjack tables, driven from stdin.")
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate the config and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("config").long("config").required(true))
        .get_matches();
    let dry_run = matches.get_flag("dry-run");

    // Load config
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config_file = std::fs::read_to_string(config_file)
        .with_context(|| format!("Could not read config file {config_file}"))?;
    let config: Config =
        serde_yaml::from_str(&config_file).context("Could not parse config file")?;
    let config = config.validate()?;

    if dry_run {
        print_dry_run_report(&config);
        if config.data_dir.is_some() {
            let executor = tokio::Runner::new(runtime_config(&config));
            executor.start(|context| async move {
                let disk = Disk::open(&context, PARTITION)
                    .await
                    .context("Could not open ledger storage")?;
                println!(
                    "  records on disk: {} (snapshot {})",
                    disk.len(),
                    disk.version()
                );
                Ok::<_, anyhow::Error>(())
            })?;
        }
        println!("config ok");
        return Ok(());
    }

    // Configure telemetry
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(config.log_level)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .with_writer(std::io::stderr)
            .init();
    }
    info!(config = ?config, "loaded config file");

    // Initialize runtime
    let executor = tokio::Runner::new(runtime_config(&config));

    // Start runtime
    executor.start(|context| async move {
        let context = context.with_label("parlor");
        if config.data_dir.is_some() {
            let store = Disk::open(&context, PARTITION)
                .await
                .context("Could not open ledger storage")?;
            run(context, config, store).await
        } else {
            run(context, config, Memory::default()).await
        }
    })
}
