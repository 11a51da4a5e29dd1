use clap::Parser;
use log::{info, LevelFilter};
use msgbox::IconType;
use van_charge_monitor::{init_logging, run};
use van_charge_monitor::cli::Args;
use van_charge_monitor::error::{error_msgbox, AppRunError, ConfigError};

// macOS refuses bluetooth access to binaries without NSBluetoothAlwaysUsageDescription.
// This embedded Info.plist is used when launching the binary directly, instead of an app bundle.
#[cfg(target_os = "macos")]
embed_plist::embed_info_plist!("../../resources/Info.plist");

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    init_logging(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    info!(concat!("VAN Charge Monitor ", env!("CARGO_PKG_VERSION")));

    let headless = args.headless;

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            let message = "This application has already been started";
            if headless {
                eprintln!("{}", message);
            } else {
                msgbox::create(
                    concat!("VAN Charge Monitor ", env!("CARGO_PKG_VERSION")),
                    message,
                    IconType::Error,
                ).unwrap_or_else(|err| eprintln!("Could not create msgbox: {:?}", err));
            }
            Ok(())
        },
        Err(err) => {
            if headless {
                eprintln!("Unexpected error: {}", err);
            } else {
                error_msgbox("Unexpected error", &err);
            }
            Err(err)
        },
        Ok(_) => Ok(())
    }
}
