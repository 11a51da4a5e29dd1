use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Initial,
    // not scanning and not connected, e.g. bluetooth is off or the scan could not be started
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Subscribed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            DeviceState::Initial => "",
            DeviceState::Idle => "Idle",
            DeviceState::Scanning => "Scanning…",
            DeviceState::Connecting => "Connecting…",
            DeviceState::Discovering => "Discovering services…",
            DeviceState::Subscribed => "Connected",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    BluetoothOn,
    BluetoothOff,
    ScanFailed(String),
    ConnectedTo(String),
    ConnectionLost,
    MissingCharacteristic,
    BluetoothUnavailable(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::BluetoothOn => write!(f, "Bluetooth on"),
            Notice::BluetoothOff => write!(f, "Bluetooth off"),
            Notice::ScanFailed(reason) => write!(f, "Scan failed: {}", reason),
            Notice::ConnectedTo(name) => write!(f, "Connected to: {}", name),
            Notice::ConnectionLost => write!(f, "Connection lost, reconnecting"),
            Notice::MissingCharacteristic => write!(f, "Device does not provide the status characteristic"),
            Notice::BluetoothUnavailable(reason) => write!(f, "Bluetooth unavailable: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    StateChange(DeviceState),
    Notice(Notice),
    Payload(String),
}
