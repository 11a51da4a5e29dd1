use std::env;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::cli::Args;
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::connection::run_connection;
use crate::display::display_task;
use crate::display::stdout::StdoutSink;
use crate::error::AppRunError;
use crate::gui::application::run_application;

pub mod cli;
pub mod config;
pub mod device;
pub mod display;
pub mod error;
pub mod gui;
pub mod telemetry;

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn run_headless(config: Config) -> Result<(), AppRunError> {
    let cancel = CancellationToken::new();
    let (sink_sender, sink_handle) = display_task(cancel.clone(), StdoutSink::new());

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, stopping");
                ctrl_c_cancel.cancel();
            },
            Err(err) => warn!("Failed to listen for ctrl-c: {}", err),
        }
    });

    let result = run_connection(cancel.clone(), config.target(), vec![sink_sender]).await;
    cancel.cancel();

    if let Err(err) = sink_handle.await {
        warn!("Failed to join display task: {}", err);
    }

    Ok(result?)
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|source| AppRunError::Runtime { source })?;

    // obtain an exclusive file lock so that only one instance of this application talks to the
    // device.
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    info!("Using config file {}", config_io.path().to_string_lossy());
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let config = runtime.block_on(config_io.read_or_init())?
        .with_overrides(&args.overrides());
    info!("Looking for {:?} with characteristic {}", config.device_name, config.characteristic_uuid);

    if args.headless {
        runtime.block_on(run_headless(config))
    } else {
        // iced brings its own runtime
        drop(runtime);
        run_application(config)
    }
}
