use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{REQUESTED_MTU, STALE_AFTER, VAN_CHARGE_MONITOR_NAME, VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC};
use crate::device::machine::Target;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub device_name: String,
    pub characteristic_uuid: Uuid,
    pub mtu: u16,
    pub stale_after_secs: u64,
}

/// Values given on the command line, these take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub device_name: Option<String>,
    pub characteristic_uuid: Option<Uuid>,
    pub stale_after: Option<Duration>,
}

impl Config {
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(name) = &overrides.device_name {
            self.device_name = name.clone();
        }
        if let Some(uuid) = overrides.characteristic_uuid {
            self.characteristic_uuid = uuid;
        }
        if let Some(stale_after) = overrides.stale_after {
            self.stale_after_secs = stale_after.as_secs();
        }
        self
    }

    pub fn target(&self) -> Target {
        Target {
            name: self.device_name.clone(),
            characteristic: self.characteristic_uuid,
            mtu: self.mtu,
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: VAN_CHARGE_MONITOR_NAME.to_string(),
            characteristic_uuid: VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC,
            mtu: REQUESTED_MTU,
            stale_after_secs: STALE_AFTER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_target_the_charge_monitor() {
        let target = Config::default().target();
        assert_eq!(target.name, "VAN Charge Monitor");
        assert_eq!(target.characteristic.to_string(), "e5d3a406-a784-4bb1-947b-630a9732098a");
        assert_eq!(target.mtu, 256);
        assert_eq!(Config::default().stale_after(), Duration::from_secs(300));
    }

    #[test]
    fn json_uses_camel_case_and_fills_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"deviceName": "Bench PSU"}"#).unwrap();
        assert_eq!(config, Config { device_name: "Bench PSU".to_string(), ..Config::default() });

        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["characteristicUuid"], "e5d3a406-a784-4bb1-947b-630a9732098a");
        assert_eq!(json["staleAfterSecs"], 300);
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let overrides = ConfigOverrides {
            device_name: Some("Other Monitor".to_string()),
            characteristic_uuid: None,
            stale_after: Some(Duration::from_secs(90)),
        };
        let config = Config::default().with_overrides(&overrides);

        assert_eq!(config, Config {
            device_name: "Other Monitor".to_string(),
            stale_after_secs: 90,
            ..Config::default()
        });
        assert_eq!(Config::default().with_overrides(&ConfigOverrides::default()), Config::default());
    }
}
