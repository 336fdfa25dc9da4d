/*!
 * Pairing Coordinator
 * Bridges the daemon's blocking pairing callbacks to the operator's event loop
 */

pub mod registration;
pub mod slot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, RejectReason, Result};
use crate::events::{CoreEvent, EventSender};
use slot::{wait_until, HandoffSlot, SendError};

pub use registration::{register_agent, AgentManager, Capability, AGENT_PATH};

/// Fixed PIN for legacy pairing.
pub const FALLBACK_PIN: &str = "0000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    PasskeyDisplay { entered: u16 },
    Confirmation,
}

/// One passkey interaction waiting on the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingExchange {
    pub id: u64,
    pub device: String,
    pub kind: ExchangeKind,
    pub passkey: u32,
}

impl PairingExchange {
    /// Zero-padded six digit form.
    pub fn passkey_digits(&self) -> String {
        format!("{:06}", self.passkey)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    Denied,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Idle,
    Awaiting { id: u64 },
    Decided { id: u64, resolution: Resolution },
}

struct Shared {
    state: Mutex<ExchangeState>,
    changed: Condvar,
    outbound: HandoffSlot<PairingExchange>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `Awaiting { id }` to `Decided`. Anything else is left alone.
    fn decide(&self, id: Option<u64>, resolution: Resolution) -> bool {
        let mut state = self.lock();
        match *state {
            ExchangeState::Awaiting { id: current } if id.map_or(true, |id| id == current) => {
                *state = ExchangeState::Decided {
                    id: current,
                    resolution,
                };
                drop(state);
                self.changed.notify_all();
                true
            }
            _ => false,
        }
    }

    fn reset(&self, mut state: MutexGuard<'_, ExchangeState>) {
        *state = ExchangeState::Idle;
        drop(state);
        self.changed.notify_all();
    }
}

/// The daemon-facing side of pairing. Every callback runs on the caller's thread and
/// may block it until the operator answers, the daemon cancels, or the timeout fires.
pub struct PairingCoordinator {
    shared: Arc<Shared>,
    events: EventSender,
    timeout: Option<Duration>,
    next_id: AtomicU64,
    relay: Option<JoinHandle<()>>,
}

impl PairingCoordinator {
    /// `events` is the operator queue; a relay thread drains the outbound slot into it.
    pub fn new(events: EventSender, timeout: Option<Duration>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ExchangeState::Idle),
            changed: Condvar::new(),
            outbound: HandoffSlot::new(),
        });

        let relay = {
            let shared = shared.clone();
            let events = events.clone();
            thread::Builder::new()
                .name("pairing-relay".into())
                .spawn(move || relay_exchanges(shared, events))
                .map_err(|e| tracing::error!("Could not start pairing relay: {}", e))
                .ok()
        };

        Self {
            shared,
            events,
            timeout,
            next_id: AtomicU64::new(1),
            relay,
        }
    }

    pub fn release(&self) -> Result<()> {
        tracing::debug!("Agent released by daemon");
        Ok(())
    }

    pub fn request_pin_code(&self, device: &str) -> Result<String> {
        tracing::debug!("PIN requested for {}, answering fallback PIN", device);
        Ok(FALLBACK_PIN.to_string())
    }

    pub fn display_pin_code(&self, device: &str, pin: &str) -> Result<()> {
        tracing::info!("PIN for {}: {}", device, pin);
        Ok(())
    }

    pub fn request_passkey(&self, device: &str) -> Result<u32> {
        tracing::debug!("Refusing passkey entry for {}", device);
        Err(Error::UnsupportedInteraction("passkey entry"))
    }

    pub fn display_passkey(&self, device: &str, passkey: u32, entered: u16) -> Result<()> {
        self.run_exchange(device, ExchangeKind::PasskeyDisplay { entered }, passkey)
    }

    pub fn request_confirmation(&self, device: &str, passkey: u32) -> Result<()> {
        self.run_exchange(device, ExchangeKind::Confirmation, passkey)
    }

    pub fn request_authorization(&self, device: &str) -> Result<()> {
        tracing::debug!("Authorizing {}", device);
        Ok(())
    }

    pub fn authorize_service(&self, device: &str, service: &str) -> Result<()> {
        tracing::debug!("Authorizing service {} for {}", service, device);
        Ok(())
    }

    /// Daemon abort. Never blocks; a no-op when nothing is in flight.
    pub fn cancel(&self) -> Result<()> {
        if self.shared.decide(None, Resolution::Cancelled) {
            tracing::info!("Pairing exchange cancelled by daemon");
        } else {
            tracing::debug!("Cancel with no exchange in flight");
        }
        Ok(())
    }

    /// Operator decision for exchange `id`. Returns false if that exchange is no longer pending.
    pub fn resolve(&self, id: u64, confirmed: bool) -> bool {
        let resolution = if confirmed {
            Resolution::Confirmed
        } else {
            Resolution::Denied
        };
        self.shared.decide(Some(id), resolution)
    }

    pub fn is_idle(&self) -> bool {
        *self.shared.lock() == ExchangeState::Idle
    }

    fn run_exchange(&self, device: &str, kind: ExchangeKind, passkey: u32) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let exchange = PairingExchange {
            id,
            device: device.to_string(),
            kind,
            passkey,
        };

        // One exchange at a time: wait for the previous one to settle
        let mut state = self.shared.lock();
        while *state != ExchangeState::Idle {
            let (guard, timed_out) = wait_until(&self.shared.changed, state, deadline);
            state = guard;
            if timed_out && *state != ExchangeState::Idle {
                tracing::warn!("Pairing exchange for {} timed out waiting for a free slot", device);
                return Err(self.timeout_error());
            }
        }
        *state = ExchangeState::Awaiting { id };
        drop(state);

        if self.relay.is_none() {
            // No relay means no operator will ever see the exchange
            tracing::warn!("Pairing relay not running, denying exchange {} for {}", id, device);
            self.shared.decide(Some(id), Resolution::Denied);
        } else {
            tracing::info!("Pairing exchange {} for {} awaiting operator", id, device);
            match self.shared.outbound.send_deadline(exchange.clone(), deadline) {
                Ok(()) => {}
                Err(SendError::TimedOut(_)) => {
                    self.shared.decide(Some(id), Resolution::TimedOut);
                }
                Err(_) => {
                    self.shared.decide(Some(id), Resolution::Cancelled);
                }
            }
        }

        let resolution = self.wait_for_decision(id, deadline);
        tracing::info!("Pairing exchange {} resolved: {:?}", id, resolution);

        let _ = self.events.send(CoreEvent::PairingExchangeResolved {
            exchange,
            resolution,
        });

        match resolution {
            Resolution::Confirmed => Ok(()),
            Resolution::Denied => Err(Error::PairingRejected(RejectReason::Denied)),
            Resolution::Cancelled => Err(Error::PairingRejected(RejectReason::Cancelled)),
            Resolution::TimedOut => Err(self.timeout_error()),
        }
    }

    fn wait_for_decision(&self, id: u64, deadline: Option<Instant>) -> Resolution {
        let mut state = self.shared.lock();
        loop {
            if let ExchangeState::Decided {
                id: decided,
                resolution,
            } = *state
            {
                if decided == id {
                    self.shared.reset(state);
                    return resolution;
                }
            }
            let (guard, timed_out) = wait_until(&self.shared.changed, state, deadline);
            state = guard;
            if timed_out && *state == (ExchangeState::Awaiting { id }) {
                self.shared.reset(state);
                return Resolution::TimedOut;
            }
        }
    }

    fn timeout_error(&self) -> Error {
        Error::PairingTimedOut(self.timeout.unwrap_or_default())
    }
}

impl Drop for PairingCoordinator {
    fn drop(&mut self) {
        self.shared.outbound.close();
        self.shared.decide(None, Resolution::Cancelled);
        if let Some(relay) = self.relay.take() {
            let _ = relay.join();
        }
    }
}

fn relay_exchanges(shared: Arc<Shared>, events: EventSender) {
    while let Some(exchange) = shared.outbound.recv() {
        let id = exchange.id;
        if events.send(CoreEvent::PairingExchangeStarted(exchange)).is_err() {
            // Nobody is listening: deny rather than leave the daemon blocked
            tracing::warn!("Operator queue closed, denying pairing exchange {}", id);
            shared.decide(Some(id), Resolution::Denied);
        }
    }
    tracing::debug!("Pairing relay stopped");
}
