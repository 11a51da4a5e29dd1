use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use uuid::Uuid;

use crate::config::types::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Shows the battery telemetry notified by a VAN Charge Monitor over Bluetooth LE", long_about = None)]
pub struct Args {
    /// Print payloads to stdout instead of opening a window
    #[arg(long)]
    pub headless: bool,

    /// Path to the JSON config file. Defaults to a file next to the executable if present, or
    /// the OS config directory otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Advertised name of the device to connect to
    #[arg(long)]
    pub device_name: Option<String>,

    /// UUID of the characteristic to receive notifications from
    #[arg(long)]
    pub characteristic: Option<Uuid>,

    /// Mark data older than this as stale, for example "90s" or "5m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub stale_after: Option<Duration>,

    /// Also log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            device_name: self.device_name.clone(),
            characteristic_uuid: self.characteristic,
            stale_after: self.stale_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_arguments_override_nothing() {
        let args = Args::try_parse_from(["van-charge-monitor"]).unwrap();
        assert!(!args.headless);
        assert!(!args.verbose);
        assert_eq!(args.config, None);
        assert_eq!(args.overrides(), ConfigOverrides::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let args = Args::try_parse_from([
            "van-charge-monitor",
            "--headless",
            "--device-name", "Garage Monitor",
            "--characteristic", "00002a19-0000-1000-8000-00805f9b34fb",
            "--stale-after", "1m 30s",
            "--config", "/tmp/monitor.json",
        ]).unwrap();

        assert!(args.headless);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/monitor.json")));
        assert_eq!(args.overrides(), ConfigOverrides {
            device_name: Some("Garage Monitor".to_string()),
            characteristic_uuid: Some(Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb)),
            stale_after: Some(Duration::from_secs(90)),
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Args::try_parse_from(["van-charge-monitor", "--characteristic", "battery"]).is_err());
        assert!(Args::try_parse_from(["van-charge-monitor", "--stale-after", "soon"]).is_err());
    }
}
