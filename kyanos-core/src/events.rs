use tokio::sync::mpsc;

use crate::adapter::Adapter;
use crate::agent::{PairingExchange, Resolution};
use crate::error::Error;
use crate::registry::DeviceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Disconnect,
    Forget,
    Scan { enable: bool },
    SetAdapter(&'static str),
}

/// Everything the core reports to the operator interface.
#[derive(Debug)]
pub enum CoreEvent {
    DevicesUpdated(DeviceSnapshot),
    AdapterUpdated(Adapter),
    PairingExchangeStarted(PairingExchange),
    PairingExchangeResolved {
        exchange: PairingExchange,
        resolution: Resolution,
    },
    OperationResult {
        address: String,
        operation: Operation,
        result: Result<(), Error>,
    },
    /// A poll failed; the next tick retries.
    PollFailed(Error),
}

pub type EventSender = mpsc::UnboundedSender<CoreEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoreEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
