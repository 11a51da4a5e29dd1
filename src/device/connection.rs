use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use futures::{SinkExt, Stream, StreamExt};
use futures::channel::mpsc::Sender;
use futures::future::pending;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter, ValueNotification};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use iced::subscription::{self, Subscription};
use log::{debug, info, trace, warn};
use tokio::time::{sleep, Duration, Sleep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CONNECT_DELAY, EVENT_CHANNEL_SIZE, SHUTDOWN_DEADLINE};
use crate::device::machine::{Action, ConnectionMachine, MachineEvent, Target};
use crate::device::types::{DeviceEvent, DeviceState, Notice};
use crate::error::DeviceError;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

async fn first_adapter(manager: &Manager) -> Result<Adapter, DeviceError> {
    let adapter = manager.adapters().await?
        .into_iter()
        .next()
        .ok_or(DeviceError::NoAdapter)?;

    info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    Ok(adapter)
}

async fn connect_peripheral(adapter: &Adapter, id: &PeripheralId) -> Result<(), DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    info!("Connecting to peripheral {:?}...", id);
    peripheral.connect().await?;
    Ok(())
}

async fn discover_characteristics(adapter: &Adapter, id: &PeripheralId) -> Result<Vec<Uuid>, DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    peripheral.discover_services().await?;

    let characteristics = peripheral.characteristics()
        .into_iter()
        .map(|characteristic| characteristic.uuid)
        .collect();
    Ok(characteristics)
}

// Enables notifications (this writes the CCCD) and returns the stream they arrive on.
async fn subscribe_characteristic(adapter: &Adapter, id: &PeripheralId, uuid: Uuid) -> Result<NotificationStream, DeviceError> {
    let peripheral = adapter.peripheral(id).await?;

    let characteristic = peripheral.characteristics()
        .into_iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .ok_or(DeviceError::MissingCharacteristic)?;

    // obtain the stream first so that the first notification can not be missed
    let stream = peripheral.notifications().await?;
    peripheral.subscribe(&characteristic).await?;
    Ok(stream)
}

async fn disconnect_peripheral(adapter: &Adapter, id: &PeripheralId) -> Result<(), DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    peripheral.disconnect().await?;
    Ok(())
}

async fn local_name(adapter: &Adapter, id: &PeripheralId) -> Option<String> {
    match adapter.peripheral(id).await {
        Ok(peripheral) => match peripheral.properties().await {
            Ok(Some(properties)) => properties.local_name,
            Ok(None) => None,
            Err(err) => {
                trace!("Could not query peripheral for properties: {:?}", err);
                None
            },
        },
        Err(err) => {
            trace!("Failed to get peripheral: {}", err);
            None
        },
    }
}

async fn next_notification(notifications: &mut Option<(PeripheralId, NotificationStream)>) -> Option<(PeripheralId, ValueNotification)> {
    match notifications {
        Some((id, stream)) => stream.next().await.map(|notification| (id.clone(), notification)),
        None => pending().await,
    }
}

async fn reconnect_due(reconnect: &mut Option<(PeripheralId, Pin<Box<Sleep>>)>) -> PeripheralId {
    match reconnect {
        Some((id, delay)) => {
            delay.as_mut().await;
            id.clone()
        },
        None => pending().await,
    }
}

/// Runs `future` to completion unless `cancel` fires first, in which case the future is dropped.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

/// A [`CentralEvent`] reduced to what the connection machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AdapterEvent<D> {
    Seen(D),
    Connected(D),
    Disconnected(D),
    PoweredOn,
    PoweredOff,
    Other,
}

impl From<CentralEvent> for AdapterEvent<PeripheralId> {
    fn from(event: CentralEvent) -> Self {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => AdapterEvent::Seen(id),
            CentralEvent::DeviceConnected(id) => AdapterEvent::Connected(id),
            CentralEvent::DeviceDisconnected(id) => AdapterEvent::Disconnected(id),
            CentralEvent::StateUpdate(CentralState::PoweredOn) => AdapterEvent::PoweredOn,
            CentralEvent::StateUpdate(CentralState::PoweredOff) => AdapterEvent::PoweredOff,
            _ => AdapterEvent::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Translated<D> {
    Ignored,
    /// Seen while scanning; the advertised name still has to be looked up.
    LookupName(D),
    Event(MachineEvent<D>),
}

fn translate_adapter_event<D: Debug>(event: AdapterEvent<D>, state: &DeviceState) -> Translated<D> {
    match event {
        // names are only of interest while looking for the device
        AdapterEvent::Seen(id) if *state == DeviceState::Scanning => Translated::LookupName(id),
        AdapterEvent::Seen(_) => Translated::Ignored,
        AdapterEvent::Connected(id) => {
            debug!("Device connected: {:?}", id);
            Translated::Ignored
        },
        AdapterEvent::Disconnected(id) => {
            debug!("Device disconnected: {:?}", id);
            Translated::Event(MachineEvent::Disconnected(id))
        },
        AdapterEvent::PoweredOn => Translated::Event(MachineEvent::AdapterOn),
        AdapterEvent::PoweredOff => Translated::Event(MachineEvent::AdapterOff),
        AdapterEvent::Other => Translated::Ignored,
    }
}

enum Wake {
    Start,
    Cancelled,
    Central(Option<CentralEvent>),
    Notification(Option<(PeripheralId, ValueNotification)>),
    Reconnect(PeripheralId),
}

struct Driver {
    adapter: Adapter,
    machine: ConnectionMachine<PeripheralId>,
    senders: Vec<Sender<DeviceEvent>>,
    notifications: Option<(PeripheralId, NotificationStream)>,
    reconnect: Option<(PeripheralId, Pin<Box<Sleep>>)>,
    previous_device_state: DeviceState,
}

impl Driver {
    fn new(adapter: Adapter, target: Target, senders: Vec<Sender<DeviceEvent>>) -> Self {
        Driver {
            adapter,
            machine: ConnectionMachine::new(target),
            senders,
            notifications: None,
            reconnect: None,
            previous_device_state: DeviceState::Initial,
        }
    }

    async fn send(&mut self, event: DeviceEvent) {
        for sender in &mut self.senders {
            if let Err(err) = sender.send(event.clone()).await {
                debug!("Display sink is gone: {}", err);
            }
        }
    }

    async fn process(&mut self, event: MachineEvent<PeripheralId>) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(next) = self.execute(action).await {
                    queue.push_back(next);
                }
            }

            self.publish_state().await;
        }
    }

    async fn publish_state(&mut self) {
        let device_state = self.machine.device_state();

        // timers and streams belonging to a device that is no longer tracked are stale
        if device_state != DeviceState::Connecting {
            self.reconnect = None;
        }
        if matches!(device_state, DeviceState::Idle | DeviceState::Scanning | DeviceState::Connecting) {
            self.notifications = None;
        }

        if device_state != self.previous_device_state {
            debug!("Device state {:?} -> {:?}", self.previous_device_state, device_state);
            self.previous_device_state = device_state.clone();
            self.send(DeviceEvent::StateChange(device_state)).await;
        }
    }

    async fn execute(&mut self, action: Action<PeripheralId>) -> Option<MachineEvent<PeripheralId>> {
        match action {
            Action::StartScan => {
                // unfiltered: the name is matched on every result instead
                match self.adapter.start_scan(ScanFilter::default()).await {
                    Ok(()) => None,
                    Err(err) => Some(MachineEvent::ScanFailed(err.to_string())),
                }
            },
            Action::StopScan => {
                if let Err(err) = self.adapter.stop_scan().await {
                    warn!("Failed to stop scanning: {}", err);
                }
                None
            },
            Action::Connect(id) => {
                match connect_peripheral(&self.adapter, &id).await {
                    Ok(()) => Some(MachineEvent::Connected(id)),
                    Err(err) => {
                        warn!("Connecting to peripheral failed: {}", err);
                        Some(MachineEvent::ConnectFailed(id))
                    },
                }
            },
            Action::ConnectLater(id) => {
                debug!("Connecting again in {} ms", CONNECT_DELAY);
                self.reconnect = Some((id, Box::pin(sleep(Duration::from_millis(CONNECT_DELAY)))));
                None
            },
            Action::RequestMtu(_, mtu) => {
                // btleplug does not expose MTU requests, the os stack negotiates the largest MTU
                // it supports on connect.
                debug!("MTU of {} requested; leaving negotiation to the platform", mtu);
                None
            },
            Action::DiscoverServices(id) => {
                match discover_characteristics(&self.adapter, &id).await {
                    Ok(characteristics) => Some(MachineEvent::ServicesDiscovered { device: id, characteristics }),
                    Err(err) => {
                        warn!("Discovering services failed: {}", err);
                        Some(MachineEvent::ConnectFailed(id))
                    },
                }
            },
            Action::Subscribe(id, uuid) => {
                match subscribe_characteristic(&self.adapter, &id, uuid).await {
                    Ok(stream) => {
                        self.notifications = Some((id.clone(), stream));
                        Some(MachineEvent::Subscribed(id))
                    },
                    Err(err) => {
                        warn!("Subscribing to {} failed: {}", uuid, err);
                        Some(MachineEvent::SubscribeFailed(id))
                    },
                }
            },
            Action::Disconnect(id) => {
                self.notifications = None;
                if let Err(err) = disconnect_peripheral(&self.adapter, &id).await {
                    warn!("Failed to disconnect {:?}: {}", id, err);
                }
                None
            },
            Action::Display(payload) => {
                self.send(DeviceEvent::Payload(payload)).await;
                None
            },
            Action::Notice(notice) => {
                info!("{}", notice);
                self.send(DeviceEvent::Notice(notice)).await;
                None
            },
        }
    }

    async fn central_event(&mut self, event: CentralEvent) -> Option<MachineEvent<PeripheralId>> {
        match translate_adapter_event(AdapterEvent::from(event), &self.machine.device_state()) {
            Translated::Ignored => None,
            Translated::LookupName(id) => {
                let name = local_name(&self.adapter, &id).await;
                trace!("Scan result {:?} {:?}", id, name);
                Some(MachineEvent::ScanResult { device: id, name })
            },
            Translated::Event(event) => Some(event),
        }
    }

    async fn wake(&mut self, wake: Wake) {
        match wake {
            Wake::Start => self.process(MachineEvent::Start).await,
            Wake::Central(Some(event)) => {
                if let Some(event) = self.central_event(event).await {
                    self.process(event).await;
                }
            },
            Wake::Notification(Some((device, notification))) => {
                self.process(MachineEvent::Notification {
                    device,
                    uuid: notification.uuid,
                    value: notification.value,
                }).await;
            },
            Wake::Notification(None) => {
                debug!("Notification stream ended");
                self.notifications = None;
            },
            Wake::Reconnect(id) => {
                self.reconnect = None;
                if let Some(event) = self.execute(Action::Connect(id)).await {
                    self.process(event).await;
                }
            },
            // these stop run_connection
            Wake::Cancelled | Wake::Central(None) => {},
        }
    }

    async fn shutdown(&mut self) {
        self.notifications = None;
        self.reconnect = None;

        if let Some(id) = self.machine.tracked_device().cloned() {
            info!("Disconnecting from {:?}", id);
            if let Err(err) = disconnect_peripheral(&self.adapter, &id).await {
                warn!("Failed to disconnect {:?}: {}", id, err);
            }
        }

        if self.machine.device_state() == DeviceState::Scanning {
            if let Err(err) = self.adapter.stop_scan().await {
                warn!("Failed to stop scanning: {}", err);
            }
        }
    }
}

/// Scans for the target, keeps it connected and forwards its notifications to `senders` until
/// `cancel` is cancelled.
pub async fn run_connection(cancel: CancellationToken, target: Target, senders: Vec<Sender<DeviceEvent>>) -> Result<(), DeviceError> {
    let manager = Manager::new().await?;
    let adapter = first_adapter(&manager).await?;
    let mut central_events = adapter.events().await?;

    let mut driver = Driver::new(adapter, target, senders);
    let mut wake = Wake::Start;

    'mainloop: loop {
        match wake {
            Wake::Cancelled => break 'mainloop,
            Wake::Central(None) => {
                warn!("Bluetooth adapter event stream ended");
                break 'mainloop;
            },
            wake => {
                // connecting may never finish, e.g. when the device went out of range
                if until_cancelled(&cancel, driver.wake(wake)).await.is_none() {
                    info!("Cancelled while talking to the device");
                    break 'mainloop;
                }
            },
        }

        wake = tokio::select! {
            _ = cancel.cancelled() => Wake::Cancelled,
            event = central_events.next() => Wake::Central(event),
            notification = next_notification(&mut driver.notifications) => Wake::Notification(notification),
            id = reconnect_due(&mut driver.reconnect) => Wake::Reconnect(id),
        };
    }

    tokio::select! {
        _ = sleep(Duration::from_millis(SHUTDOWN_DEADLINE)) => {
            warn!("Disconnecting took too long");
        }
        _ = driver.shutdown() => {}
    };
    info!("Device connection stopped");
    Ok(())
}

async fn connect_device(cancel: CancellationToken, target: Target, mut senders: Vec<Sender<DeviceEvent>>) -> Infallible {
    if let Err(err) = run_connection(cancel, target, senders.clone()).await {
        warn!("Device connection failed: {}", err);
        for sender in &mut senders {
            let _ = sender.send(DeviceEvent::Notice(Notice::BluetoothUnavailable(err.to_string()))).await;
        }
    }

    // note: subscription::channel expects the future to never resolve (Infallible)
    pending().await
}

pub fn connect_device_subscription(cancel: CancellationToken, target: Target, senders: Vec<Sender<DeviceEvent>>) -> Subscription<DeviceEvent> {
    struct Connect;

    subscription::channel(
        std::any::TypeId::of::<Connect>(),
        EVENT_CHANNEL_SIZE,
        move |subscription_sender| {
            let mut senders = senders.clone();
            senders.push(subscription_sender);

            async move {
                connect_device(cancel, target, senders).await
            }
        },
    )
}
