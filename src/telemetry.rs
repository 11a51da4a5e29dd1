//! Charger status as reported by the charge monitor firmware.
//!
//! The characteristic carries a string. When that string is a JSON object with the fields below it
//! is shown in a structured way; anything else is only shown verbatim.

use std::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentStatus {
    pub power_w: f32,
    pub current_a: f32,
    pub voltage_v: f32,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} V  {:.2} A  {:.1} W", self.voltage_v, self.current_a, self.power_w)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerStatus {
    pub solar: ComponentStatus,
    pub alternator: ComponentStatus,
    pub battery: ComponentStatus,
    pub total_daily_charge_ah: u16,
    pub status_bits1: u16,
    pub status_bits2: u16,
    pub status_bits3: u16,
    pub battery_percentage: u8,
}

impl ChargerStatus {
    /// Best effort parse of a notification payload, `None` unless it is a JSON object.
    pub fn parse(payload: &str) -> Option<ChargerStatus> {
        let value: serde_json::Value = serde_json::from_str(payload.trim()).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Battery: {}% {}", self.battery_percentage, self.battery),
            format!("Solar: {}", self.solar),
            format!("Alternator: {}", self.alternator),
            format!("Charged today: {} Ah", self.total_daily_charge_ah),
            format!(
                "Status: {:04x} {:04x} {:04x}",
                self.status_bits1, self.status_bits2, self.status_bits3,
            ),
        ]
    }
}
