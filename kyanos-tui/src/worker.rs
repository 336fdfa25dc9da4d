/*!
 * KYANOS Worker
 * Short-lived gateway tasks reporting back through the event queue
 */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use kyanos_core::adapter::find_adapter;
use kyanos_core::events::EventSender;
use kyanos_core::gateway::ADAPTER_INTERFACE;
use kyanos_core::registry::snapshot_devices;
use kyanos_core::{
    AdapterProperty, Command, Config, CoreEvent, Device, Gateway, Operation, Result,
};

#[derive(Clone)]
pub struct Worker {
    gateway: Arc<dyn Gateway>,
    events: EventSender,
    pairing_delay: Duration,
    disconnect_delay: Duration,
    auto_trust: bool,
}

impl Worker {
    pub fn new(gateway: Arc<dyn Gateway>, events: EventSender, config: &Config) -> Self {
        Self {
            gateway,
            events,
            pairing_delay: config.pairing_delay(),
            disconnect_delay: config.disconnect_delay(),
            auto_trust: config.auto_trust_on_pair,
        }
    }

    /// One snapshot feeds both the device set and the adapter state.
    pub fn poll(&self) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            match gateway.snapshot().await {
                Ok(tree) => {
                    let _ = events.send(CoreEvent::DevicesUpdated(snapshot_devices(&tree)));
                    if let Some(adapter) = find_adapter(&tree, Some(gateway.adapter_path())) {
                        let _ = events.send(CoreEvent::AdapterUpdated(adapter));
                    }
                }
                Err(e) => {
                    tracing::warn!("Poll failed: {}", e);
                    let _ = events.send(CoreEvent::PollFailed(e));
                }
            }
        })
    }

    /// Pairs first when needed, then connects.
    pub fn connect(&self, device: &Device) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let path = device.path.clone();
        let needs_pairing = !device.paired;
        let needs_trust = self.auto_trust && !device.trusted;
        let settle = self.pairing_delay;

        self.spawn_operation(device.address.clone(), Operation::Connect, async move {
            if needs_pairing {
                tracing::info!("Pairing {}", path);
                gateway.call(&Command::Pair(path.clone())).await?;
            }
            if needs_trust {
                if let Err(e) = gateway.call(&Command::Trust(path.clone())).await {
                    tracing::warn!("Could not trust {}: {}", path, e);
                }
            }
            if needs_pairing {
                tokio::time::sleep(settle).await;
            }
            gateway.call(&Command::Connect(path)).await
        })
    }

    pub fn disconnect(&self, device: &Device) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let path = device.path.clone();
        self.spawn_operation(device.address.clone(), Operation::Disconnect, async move {
            gateway.call(&Command::Disconnect(path)).await
        })
    }

    /// Disconnects a connected device before asking the daemon to drop it.
    pub fn forget(&self, device: &Device) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let path = device.path.clone();
        let connected = device.connected;
        let settle = self.disconnect_delay;

        self.spawn_operation(device.address.clone(), Operation::Forget, async move {
            if connected {
                gateway.call(&Command::Disconnect(path.clone())).await?;
                tokio::time::sleep(settle).await;
            }
            gateway.call(&Command::RemoveDevice(path)).await
        })
    }

    pub fn set_scanning(&self, enable: bool) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let command = if enable {
            Command::StartDiscovery
        } else {
            Command::StopDiscovery
        };
        let target = gateway.adapter_path().to_string();
        self.spawn_operation(target, Operation::Scan { enable }, async move {
            gateway.call(&command).await
        })
    }

    /// Flips discovery based on the adapter's live `Discovering` flag.
    pub fn toggle_scanning(&self) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let adapter = gateway.adapter_path().to_string();
            let discovering = match gateway
                .get_property(&adapter, ADAPTER_INTERFACE, "Discovering")
                .await
            {
                Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
                Err(e) => {
                    tracing::warn!("Could not read discovery state: {}", e);
                    false
                }
            };

            let enable = !discovering;
            let command = if enable {
                Command::StartDiscovery
            } else {
                Command::StopDiscovery
            };
            let result = gateway.call(&command).await;
            report(&events, adapter, Operation::Scan { enable }, result);
        })
    }

    pub fn set_adapter(&self, property: AdapterProperty) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let target = gateway.adapter_path().to_string();
        let operation = Operation::SetAdapter(property.name());
        self.spawn_operation(target, operation, async move {
            gateway.call(&Command::SetAdapter(property)).await
        })
    }

    /// Awaited directly on the way out, not spawned.
    pub async fn stop_discovery(&self) -> Result<()> {
        self.gateway.call(&Command::StopDiscovery).await
    }

    fn spawn_operation<F>(&self, address: String, operation: Operation, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = task.await;
            report(&events, address, operation, result);
        })
    }
}

fn report(events: &EventSender, address: String, operation: Operation, result: Result<()>) {
    let result = result.map_err(|e| e.at(&address));
    match &result {
        Ok(()) => tracing::info!("{:?} succeeded for {}", operation, address),
        Err(e) => tracing::warn!("{:?} failed: {}", operation, e),
    }
    let _ = events.send(CoreEvent::OperationResult {
        address,
        operation,
        result,
    });
}
