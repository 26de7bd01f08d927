use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use serptrack::config::CONFIG_ENV_VAR;
use serptrack::logging::init_logging;
use serptrack::{
    load_config, ConfigError, Database, Engine, EngineError, EngineSettings, HttpGateway,
    Scheduler,
};

fn config_path() -> Result<String, ConfigError> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .filter(|p| !p.is_empty())
        .ok_or(ConfigError::MissingPath {
            env_var: CONFIG_ENV_VAR,
        })
}

fn run() -> Result<(), EngineError> {
    let config = load_config(config_path()?)?;
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("serptrackd: {}", e);
    }
    tracing::info!("Starting serptrackd v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config
        .database
        .resolved_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "could not determine a database path (no home directory)".to_string(),
        })?;
    let db = Database::open(&db_path)?;

    let gateway = HttpGateway::new(config.gateway.http_config()?)?;
    let engine = Arc::new(Engine::new(
        db,
        Arc::new(gateway),
        EngineSettings::from_config(&config),
    ));

    let scheduler = Scheduler::from_config(Arc::clone(&engine), &config.scheduler);
    let handle = scheduler.start(engine.subscribe());

    let (stop_tx, stop_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        scheduler.stop();
        let _ = handle.join();
        return Ok(());
    }

    let _ = stop_rx.recv();
    tracing::info!("Shutting down");
    scheduler.stop();
    if handle.join().is_err() {
        tracing::error!("Scheduler thread panicked");
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("serptrackd: {}", e);
            ExitCode::FAILURE
        }
    }
}
