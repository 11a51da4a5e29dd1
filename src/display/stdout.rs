use std::io::{self, Write};
use std::time::SystemTime;
use log::warn;

use crate::display::DisplaySink;
use crate::telemetry::ChargerStatus;

/// Writes one line per payload: `<timestamp> <payload>`, followed by the parsed charger status
/// when the payload is one.
pub struct StdoutSink<W: Write = io::Stdout> {
    out: W,
}

impl StdoutSink {
    pub fn new() -> Self {
        StdoutSink { out: io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutSink<W> {
    pub fn with_writer(out: W) -> Self {
        StdoutSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_payload(&mut self, payload: &str) -> io::Result<()> {
        writeln!(self.out, "{} {}", humantime::format_rfc3339_seconds(SystemTime::now()), payload)?;

        if let Some(status) = ChargerStatus::parse(payload) {
            for line in status.lines() {
                writeln!(self.out, "    {}", line)?;
            }
        }

        self.out.flush()
    }
}

impl<W: Write> DisplaySink for StdoutSink<W> {
    fn display_data(&mut self, payload: &str) {
        if let Err(err) = self.write_payload(payload) {
            warn!("Failed to write payload to stdout: {}", err);
        }
    }
}
