//! Binary entrypoint for `dumpsessions`.
use std::{io, path::PathBuf, process};

use clap::Parser;
use dumpsessions::{
    hooks::{self, Hook},
    output::Format,
    pump,
    settings::Settings,
};
use logging::{self as logshared, fmt as logfmt};
use session_watch::{SessionEvent, SessionWatcher};
use tokio::{signal, sync::mpsc};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "dumpsessions",
    about = "Print Windows session changes as they happen",
    version
)]
/// Command-line interface for the `dumpsessions` binary.
struct Cli {
    /// Optional path to a TOML settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print one JSON object per event instead of text
    #[arg(long)]
    json: bool,

    /// Override the relay queue capacity
    #[arg(long, value_name = "N")]
    queue_capacity: Option<usize>,

    /// Logging controls
    #[command(flatten)]
    log: logshared::LogArgs,
}

fn main() {
    let cli = Cli::parse();

    let spec = cli.log.spec();
    let env_filter = match logshared::env_filter_from_spec(&spec) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("invalid log filter {spec:?}: {e}");
            process::exit(2);
        }
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(logfmt::layer(|r| eprintln!("{r}")))
        .try_init()
        .ok();

    if let Err(e) = run(&cli) {
        error!(error = %e, "dumpsessions_failed");
        eprintln!("{e}");
        process::exit(1);
    }
}

/// Load settings from `--config` and apply command-line overrides.
fn load_settings(cli: &Cli) -> dumpsessions::Result<(Settings, Vec<Hook>)> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(n) = cli.queue_capacity {
        settings.watcher.queue_capacity = n;
    }
    settings.watcher.validate()?;
    let hooks = settings.compile_hooks()?;
    Ok((settings, hooks))
}

/// Start the watcher and print events until Ctrl-C.
fn run(cli: &Cli) -> dumpsessions::Result<()> {
    let (settings, hooks) = load_settings(cli)?;
    let format = if cli.json { Format::Json } else { Format::Text };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
    let watcher = SessionWatcher::start_with(settings.watcher, move |ev: SessionEvent| {
        let _ = tx.send(ev);
    })?;
    info!(
        id = watcher.id().get(),
        hooks = hooks.len(),
        "watching_sessions_ctrl_c_to_quit"
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "ctrl_c_handler_failed");
        }
    };
    let result = rt.block_on(async {
        let started = hooks::fire_start(&hooks);
        if started > 0 {
            info!(hooks = started, "start_hooks_fired");
        }
        pump(rx, &hooks, format, io::stdout().lock(), shutdown).await
    });

    let outcome = watcher.stop();
    info!(?outcome, "watcher_stopped");
    result.map(|n| info!(events = n, "done"))
}
