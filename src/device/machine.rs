//! Platform independent connection logic.
//!
//! [`ConnectionMachine`] consumes [`MachineEvent`]s (scan results, GATT results, adapter power
//! changes, notifications) and answers with the [`Action`]s the bluetooth driver has to perform.
//! It never talks to the bluetooth stack itself, the driver in `connection.rs` does that.

use std::fmt::Debug;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::device::types::{DeviceState, Notice};

/// What to look for while scanning and what to subscribe to once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub characteristic: Uuid,
    pub mtu: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MachineState<D> {
    Idle,
    Scanning,
    Connecting { device: D },
    Discovering { device: D },
    Subscribed { device: D },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent<D> {
    Start,
    AdapterOn,
    AdapterOff,
    ScanResult {
        device: D,
        name: Option<String>,
    },
    ScanFailed(String),
    Connected(D),
    ConnectFailed(D),
    ServicesDiscovered {
        device: D,
        characteristics: Vec<Uuid>,
    },
    Subscribed(D),
    SubscribeFailed(D),
    Notification {
        device: D,
        uuid: Uuid,
        value: Vec<u8>,
    },
    Disconnected(D),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<D> {
    StartScan,
    StopScan,
    Connect(D),
    // connect again after CONNECT_DELAY
    ConnectLater(D),
    RequestMtu(D, u16),
    DiscoverServices(D),
    Subscribe(D, Uuid),
    Disconnect(D),
    Display(String),
    Notice(Notice),
}

pub struct ConnectionMachine<D> {
    target: Target,
    state: MachineState<D>,
}

impl<D: Clone + PartialEq + Debug> ConnectionMachine<D> {
    pub fn new(target: Target) -> Self {
        ConnectionMachine {
            target,
            state: MachineState::Idle,
        }
    }

    pub fn device_state(&self) -> DeviceState {
        match self.state {
            MachineState::Idle => DeviceState::Idle,
            MachineState::Scanning => DeviceState::Scanning,
            MachineState::Connecting { .. } => DeviceState::Connecting,
            MachineState::Discovering { .. } => DeviceState::Discovering,
            MachineState::Subscribed { .. } => DeviceState::Subscribed,
        }
    }

    /// The device that is being connected to or is connected, at most one at a time.
    pub fn tracked_device(&self) -> Option<&D> {
        match &self.state {
            MachineState::Idle | MachineState::Scanning => None,
            MachineState::Connecting { device }
            | MachineState::Discovering { device }
            | MachineState::Subscribed { device } => Some(device),
        }
    }

    fn is_tracked(&self, device: &D) -> bool {
        self.tracked_device() == Some(device)
    }

    // Forget the current device (if any) and scan from scratch.
    fn restart_scan(&mut self) -> Vec<Action<D>> {
        let mut actions = Vec::new();

        if let Some(device) = self.tracked_device() {
            actions.push(Action::Disconnect(device.clone()));
        }

        actions.push(Action::StopScan);
        actions.push(Action::StartScan);
        self.state = MachineState::Scanning;
        actions
    }

    // Keep the device and try again, the way an auto connecting GATT client does.
    fn reconnect(&mut self, device: D) -> Vec<Action<D>> {
        self.state = MachineState::Connecting { device: device.clone() };
        vec![Action::ConnectLater(device)]
    }

    pub fn handle(&mut self, event: MachineEvent<D>) -> Vec<Action<D>> {
        match event {
            MachineEvent::Start => {
                info!("Scanning for {:?}", self.target.name);
                self.restart_scan()
            },
            MachineEvent::AdapterOn => {
                info!("Bluetooth adapter powered on; restarting scan");
                let mut actions = vec![Action::Notice(Notice::BluetoothOn)];
                actions.extend(self.restart_scan());
                actions
            },
            MachineEvent::AdapterOff => {
                info!("Bluetooth adapter powered off");
                self.state = MachineState::Idle;
                vec![Action::Notice(Notice::BluetoothOff)]
            },
            MachineEvent::ScanResult { device, name } => {
                if name.as_deref() != Some(self.target.name.as_str()) {
                    return vec![];
                }

                if self.state != MachineState::Scanning {
                    debug!("Ignoring {:?}: already tracking {:?}", device, self.tracked_device());
                    return vec![];
                }

                info!("Found {:?} ({:?})", self.target.name, device);
                self.state = MachineState::Connecting { device: device.clone() };
                vec![Action::StopScan, Action::Connect(device)]
            },
            MachineEvent::ScanFailed(reason) => {
                warn!("Scan failed: {}", reason);
                if self.state == MachineState::Scanning {
                    self.state = MachineState::Idle;
                }
                vec![Action::Notice(Notice::ScanFailed(reason))]
            },
            MachineEvent::Connected(device) => match &self.state {
                MachineState::Connecting { device: tracked } if *tracked == device => {
                    info!("Connected; Discovering services...");
                    self.state = MachineState::Discovering { device: device.clone() };
                    vec![
                        Action::RequestMtu(device.clone(), self.target.mtu),
                        Action::DiscoverServices(device),
                    ]
                },
                _ => vec![],
            },
            MachineEvent::ConnectFailed(device) | MachineEvent::SubscribeFailed(device) => match &self.state {
                MachineState::Connecting { device: tracked } if *tracked == device => {
                    self.reconnect(device)
                },
                MachineState::Discovering { device: tracked } if *tracked == device => {
                    let mut actions = vec![Action::Disconnect(device.clone())];
                    actions.extend(self.reconnect(device));
                    actions
                },
                _ => vec![],
            },
            MachineEvent::ServicesDiscovered { device, characteristics } => match &self.state {
                MachineState::Discovering { device: tracked } if *tracked == device => {
                    if characteristics.contains(&self.target.characteristic) {
                        info!("Subscribing to characteristic {}", self.target.characteristic);
                        vec![Action::Subscribe(device, self.target.characteristic)]
                    } else {
                        warn!("{:?} has no characteristic {}", device, self.target.characteristic);
                        let mut actions = vec![Action::Notice(Notice::MissingCharacteristic)];
                        actions.extend(self.restart_scan());
                        actions
                    }
                },
                _ => vec![],
            },
            MachineEvent::Subscribed(device) => match &self.state {
                MachineState::Discovering { device: tracked } if *tracked == device => {
                    info!("Peripheral ready");
                    self.state = MachineState::Subscribed { device };
                    vec![Action::Notice(Notice::ConnectedTo(self.target.name.clone()))]
                },
                _ => vec![],
            },
            MachineEvent::Notification { device, uuid, value } => {
                let subscribed = matches!(&self.state, MachineState::Subscribed { device: tracked } if *tracked == device);

                if !subscribed || uuid != self.target.characteristic {
                    debug!("Ignoring notification from {:?} for {}", device, uuid);
                    return vec![];
                }

                let payload = String::from_utf8_lossy(value.as_slice()).into_owned();
                info!("{}", payload);
                vec![Action::Display(payload)]
            },
            MachineEvent::Disconnected(device) => {
                // a connection attempt in progress reports its own failure
                if !self.is_tracked(&device) || matches!(self.state, MachineState::Connecting { .. }) {
                    return vec![];
                }

                info!("Disconnected");
                let mut actions = vec![Action::Notice(Notice::ConnectionLost)];
                actions.extend(self.reconnect(device));
                actions
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::device::constants::{REQUESTED_MTU, VAN_CHARGE_MONITOR_NAME, VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC};

    const OTHER_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

    fn machine() -> ConnectionMachine<u32> {
        ConnectionMachine::new(Target {
            name: VAN_CHARGE_MONITOR_NAME.to_string(),
            characteristic: VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC,
            mtu: REQUESTED_MTU,
        })
    }

    fn scan_result(device: u32, name: &str) -> MachineEvent<u32> {
        MachineEvent::ScanResult { device, name: Some(name.to_string()) }
    }

    fn connects(actions: &[Action<u32>]) -> Vec<u32> {
        actions.iter().filter_map(|action| match action {
            Action::Connect(device) => Some(*device),
            _ => None,
        }).collect()
    }

    // drives the machine from scanning to subscribed on `device`
    fn subscribed(device: u32) -> ConnectionMachine<u32> {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        m.handle(scan_result(device, VAN_CHARGE_MONITOR_NAME));
        m.handle(MachineEvent::Connected(device));
        m.handle(MachineEvent::ServicesDiscovered {
            device,
            characteristics: vec![OTHER_CHARACTERISTIC, VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC],
        });
        m.handle(MachineEvent::Subscribed(device));
        m
    }

    fn notification(device: u32, value: &[u8]) -> MachineEvent<u32> {
        MachineEvent::Notification {
            device,
            uuid: VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC,
            value: value.to_vec(),
        }
    }

    #[test]
    fn start_scans() {
        let mut m = machine();
        assert_eq!(m.handle(MachineEvent::Start), vec![Action::StopScan, Action::StartScan]);
        assert_eq!(m.device_state(), DeviceState::Scanning);
    }

    #[test]
    fn other_names_never_connect() {
        let mut m = machine();
        m.handle(MachineEvent::Start);

        for name in ["Other Device", "VAN Charge", "van charge monitor", "VAN Charge Monitor 2", ""] {
            assert_eq!(m.handle(scan_result(1, name)), vec![]);
        }
        assert_eq!(m.handle(MachineEvent::ScanResult { device: 1, name: None }), vec![]);
        assert_eq!(m.device_state(), DeviceState::Scanning);
        assert_eq!(m.tracked_device(), None);
    }

    #[test]
    fn first_match_wins() {
        let mut m = machine();
        m.handle(MachineEvent::Start);

        let mut actions = Vec::new();
        actions.extend(m.handle(scan_result(1, "Other Device")));
        actions.extend(m.handle(scan_result(2, VAN_CHARGE_MONITOR_NAME)));
        actions.extend(m.handle(scan_result(3, VAN_CHARGE_MONITOR_NAME)));

        assert_eq!(connects(&actions), vec![2]);
        assert_eq!(actions, vec![Action::StopScan, Action::Connect(2)]);
        assert_eq!(m.tracked_device(), Some(&2));
    }

    #[test]
    fn duplicate_advertisements_while_subscribed_are_ignored() {
        let mut m = subscribed(7);
        assert_eq!(m.handle(scan_result(7, VAN_CHARGE_MONITOR_NAME)), vec![]);
        assert_eq!(m.handle(scan_result(8, VAN_CHARGE_MONITOR_NAME)), vec![]);
        assert_eq!(m.device_state(), DeviceState::Subscribed);
    }

    #[test]
    fn connect_discover_subscribe() {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        m.handle(scan_result(4, VAN_CHARGE_MONITOR_NAME));

        assert_eq!(
            m.handle(MachineEvent::Connected(4)),
            vec![Action::RequestMtu(4, REQUESTED_MTU), Action::DiscoverServices(4)],
        );
        assert_eq!(m.device_state(), DeviceState::Discovering);

        assert_eq!(
            m.handle(MachineEvent::ServicesDiscovered {
                device: 4,
                characteristics: vec![OTHER_CHARACTERISTIC, VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC],
            }),
            vec![Action::Subscribe(4, VAN_CHARGE_MONITOR_STATUS_CHARACTERISTIC)],
        );

        assert_eq!(
            m.handle(MachineEvent::Subscribed(4)),
            vec![Action::Notice(Notice::ConnectedTo(VAN_CHARGE_MONITOR_NAME.to_string()))],
        );
        assert_eq!(m.device_state(), DeviceState::Subscribed);
    }

    #[test]
    fn missing_characteristic_rescans() {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        m.handle(scan_result(4, VAN_CHARGE_MONITOR_NAME));
        m.handle(MachineEvent::Connected(4));

        assert_eq!(
            m.handle(MachineEvent::ServicesDiscovered { device: 4, characteristics: vec![OTHER_CHARACTERISTIC] }),
            vec![
                Action::Notice(Notice::MissingCharacteristic),
                Action::Disconnect(4),
                Action::StopScan,
                Action::StartScan,
            ],
        );
        assert_eq!(m.device_state(), DeviceState::Scanning);
    }

    #[test]
    fn notifications_are_displayed_unmodified() {
        let mut m = subscribed(1);

        assert_eq!(m.handle(notification(1, b"12.6V")), vec![Action::Display("12.6V".to_string())]);

        let json = r#"{"battery":{"voltage_v":12.6}}"#;
        assert_eq!(m.handle(notification(1, json.as_bytes())), vec![Action::Display(json.to_string())]);

        // quotes and script like content are passed through as is
        let tricky = "');alert('x";
        assert_eq!(m.handle(notification(1, tricky.as_bytes())), vec![Action::Display(tricky.to_string())]);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut m = subscribed(1);
        assert_eq!(
            m.handle(notification(1, &[b'1', 0xff, b'V'])),
            vec![Action::Display("1\u{fffd}V".to_string())],
        );
    }

    #[test]
    fn notifications_before_subscription_or_for_other_characteristics_are_dropped() {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        assert_eq!(m.handle(notification(1, b"12.6V")), vec![]);

        let mut m = subscribed(1);
        assert_eq!(
            m.handle(MachineEvent::Notification { device: 1, uuid: OTHER_CHARACTERISTIC, value: b"x".to_vec() }),
            vec![],
        );
        assert_eq!(m.handle(notification(2, b"12.6V")), vec![]);
    }

    #[test]
    fn adapter_on_without_device_restarts_scan() {
        let mut m = machine();
        m.handle(MachineEvent::AdapterOff);
        assert_eq!(m.device_state(), DeviceState::Idle);

        assert_eq!(
            m.handle(MachineEvent::AdapterOn),
            vec![Action::Notice(Notice::BluetoothOn), Action::StopScan, Action::StartScan],
        );
        assert_eq!(m.device_state(), DeviceState::Scanning);
    }

    #[test]
    fn adapter_on_drops_tracked_device() {
        let mut m = subscribed(3);

        assert_eq!(
            m.handle(MachineEvent::AdapterOn),
            vec![Action::Notice(Notice::BluetoothOn), Action::Disconnect(3), Action::StopScan, Action::StartScan],
        );
        assert_eq!(m.tracked_device(), None);

        // a new match is accepted again
        assert_eq!(connects(&m.handle(scan_result(5, VAN_CHARGE_MONITOR_NAME))), vec![5]);
    }

    #[test]
    fn adapter_off_forgets_device() {
        let mut m = subscribed(3);
        assert_eq!(m.handle(MachineEvent::AdapterOff), vec![Action::Notice(Notice::BluetoothOff)]);
        assert_eq!(m.tracked_device(), None);
        assert_eq!(m.handle(notification(3, b"12.6V")), vec![]);
    }

    #[test]
    fn scan_failure_goes_idle_without_retry() {
        let mut m = machine();
        m.handle(MachineEvent::Start);

        assert_eq!(
            m.handle(MachineEvent::ScanFailed("permission denied".to_string())),
            vec![Action::Notice(Notice::ScanFailed("permission denied".to_string()))],
        );
        assert_eq!(m.device_state(), DeviceState::Idle);
        assert_eq!(m.handle(scan_result(1, VAN_CHARGE_MONITOR_NAME)), vec![]);
    }

    #[test]
    fn connection_loss_reconnects_to_same_device() {
        let mut m = subscribed(9);

        assert_eq!(
            m.handle(MachineEvent::Disconnected(9)),
            vec![Action::Notice(Notice::ConnectionLost), Action::ConnectLater(9)],
        );
        assert_eq!(m.device_state(), DeviceState::Connecting);
        assert_eq!(m.tracked_device(), Some(&9));

        // the link drop reported while reconnecting is not a second loss
        assert_eq!(m.handle(MachineEvent::Disconnected(9)), vec![]);
        // other devices dropping are irrelevant
        assert_eq!(m.handle(MachineEvent::Disconnected(10)), vec![]);

        assert_eq!(m.handle(MachineEvent::ConnectFailed(9)), vec![Action::ConnectLater(9)]);
        assert_eq!(connects(&m.handle(scan_result(10, VAN_CHARGE_MONITOR_NAME))), Vec::<u32>::new());
    }

    #[test]
    fn subscribe_failure_disconnects_and_retries() {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        m.handle(scan_result(2, VAN_CHARGE_MONITOR_NAME));
        m.handle(MachineEvent::Connected(2));

        assert_eq!(
            m.handle(MachineEvent::SubscribeFailed(2)),
            vec![Action::Disconnect(2), Action::ConnectLater(2)],
        );
        assert_eq!(m.device_state(), DeviceState::Connecting);
    }

    #[test]
    fn results_for_untracked_devices_are_ignored() {
        let mut m = machine();
        m.handle(MachineEvent::Start);
        m.handle(scan_result(1, VAN_CHARGE_MONITOR_NAME));

        assert_eq!(m.handle(MachineEvent::Connected(2)), vec![]);
        assert_eq!(m.handle(MachineEvent::Subscribed(1)), vec![]);
        assert_eq!(m.device_state(), DeviceState::Connecting);
    }
}
