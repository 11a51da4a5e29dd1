use std::time::Instant;
use iced::Event;

use crate::device::types::DeviceEvent;

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    Tick(Instant),
    DeviceEvent(DeviceEvent),
}
