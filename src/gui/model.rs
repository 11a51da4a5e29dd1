use std::time::{Duration, Instant};

use crate::device::types::{DeviceState, Notice};
use crate::display::DisplaySink;
use crate::telemetry::ChargerStatus;

/**
 * How long a notice stays visible, similar to a short toast.
 */
pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Reading {
    pub payload: String,
    pub status: Option<ChargerStatus>,
    pub received: Instant,
}

/// Everything the window shows, fed through [`DisplaySink`].
#[derive(Debug)]
pub struct DisplayModel {
    pub device_state: DeviceState,
    pub reading: Option<Reading>,
    notice: Option<(Notice, Instant)>,
    stale_after: Duration,
}

impl DisplayModel {
    pub fn new(stale_after: Duration) -> Self {
        DisplayModel {
            device_state: DeviceState::Initial,
            reading: None,
            notice: None,
            stale_after,
        }
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.reading.as_ref().map(|reading| now.saturating_duration_since(reading.received))
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match self.age(now) {
            Some(age) => age > self.stale_after,
            None => false,
        }
    }

    pub fn visible_notice(&self, now: Instant) -> Option<&Notice> {
        let (notice, shown) = self.notice.as_ref()?;

        // bluetooth being unavailable is not going to resolve itself, keep it on screen
        if matches!(notice, Notice::BluetoothUnavailable(_)) {
            return Some(notice);
        }

        if now.saturating_duration_since(*shown) < NOTICE_DURATION {
            Some(notice)
        } else {
            None
        }
    }

    pub fn age_label(&self, now: Instant) -> Option<String> {
        let age = self.age(now)?;
        let age = humantime::format_duration(Duration::from_secs(age.as_secs()));

        if self.is_stale(now) {
            Some(format!("Stale, received {} ago", age))
        } else {
            Some(format!("Updated {} ago", age))
        }
    }
}

impl DisplaySink for DisplayModel {
    fn display_data(&mut self, payload: &str) {
        self.reading = Some(Reading {
            payload: payload.to_string(),
            status: ChargerStatus::parse(payload),
            received: Instant::now(),
        });
    }

    fn device_state(&mut self, state: &DeviceState) {
        self.device_state = state.clone();
    }

    fn notice(&mut self, notice: &Notice) {
        self.notice = Some((notice.clone(), Instant::now()));
    }
}
