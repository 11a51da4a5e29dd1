//! Display sinks: where decoded payloads end up.

use futures::channel::mpsc::{channel, Sender};
use futures::StreamExt;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::constants::EVENT_CHANNEL_SIZE;
use crate::device::types::{DeviceEvent, DeviceState, Notice};

pub mod stdout;

pub trait DisplaySink {
    /// Called with every decoded notification payload, exactly as received.
    fn display_data(&mut self, payload: &str);

    fn device_state(&mut self, _state: &DeviceState) {}

    fn notice(&mut self, _notice: &Notice) {}
}

pub fn dispatch<S: DisplaySink + ?Sized>(sink: &mut S, event: &DeviceEvent) {
    match event {
        DeviceEvent::StateChange(state) => sink.device_state(state),
        DeviceEvent::Notice(notice) => sink.notice(notice),
        DeviceEvent::Payload(payload) => sink.display_data(payload),
    }
}

/// Spawns a task that feeds device events into `sink` until cancelled or until every sender is
/// dropped. The sink is handed back when the task ends.
pub fn display_task<S>(cancel: CancellationToken, mut sink: S) -> (Sender<DeviceEvent>, JoinHandle<S>)
where
    S: DisplaySink + Send + 'static,
{
    let (tx, mut rx) = channel::<DeviceEvent>(EVENT_CHANNEL_SIZE);

    let handle = spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                event = rx.next() => match event {
                    Some(event) => dispatch(&mut sink, &event),
                    None => break 'mainloop,
                },
            }
        }

        sink
    });

    (tx, handle)
}
