/*!
 * BlueZ Gateway
 * Device and adapter control via the org.bluez D-Bus service
 */

mod agent;
mod convert;

pub use agent::export_agent;

use async_trait::async_trait;
use dbus::arg::{RefArg, Variant};
use dbus::nonblock::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::Path;
use dbus_tokio::connection;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::find_adapter;
use crate::agent::{AgentManager, Capability};
use crate::error::{Error, Result};
use crate::gateway::{
    AdapterProperty, Command, Gateway, ObjectTree, PropValue, ADAPTER_INTERFACE, DEVICE_INTERFACE,
};

const BLUEZ_SERVICE: &str = "org.bluez";
const BLUEZ_ROOT: &str = "/org/bluez";
const AGENT_MANAGER_INTERFACE: &str = "org.bluez.AgentManager1";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// Must outlast an operator answering the pairing prompt
const PAIR_TIMEOUT: Duration = Duration::from_secs(180);

pub struct BluezGateway {
    conn: Arc<SyncConnection>,
    adapter: String,
}

impl BluezGateway {
    /// Connects to the system bus and binds to the first adapter.
    pub async fn connect() -> Result<Self> {
        let (resource, conn) =
            connection::new_system_sync().map_err(|e| Error::GatewayUnavailable(describe(&e)))?;

        tokio::spawn(async move {
            let err = resource.await;
            tracing::error!("Lost connection to D-Bus: {}", err);
        });

        let mut gateway = Self {
            conn,
            adapter: String::new(),
        };

        let tree = gateway.snapshot().await?;
        let adapter = find_adapter(&tree, None).ok_or(Error::AdapterNotFound)?;
        tracing::info!("Using adapter {} ({})", adapter.path, adapter.address);
        gateway.adapter = adapter.path;

        Ok(gateway)
    }

    pub fn connection(&self) -> Arc<SyncConnection> {
        self.conn.clone()
    }

    fn proxy<'a>(&self, path: &'a str, timeout: Duration) -> Proxy<'a, Arc<SyncConnection>> {
        Proxy::new(BLUEZ_SERVICE, path, timeout, self.conn.clone())
    }

    async fn set_adapter(&self, prop: &AdapterProperty) -> std::result::Result<(), dbus::Error> {
        let proxy = self.proxy(&self.adapter, CALL_TIMEOUT);
        match prop {
            AdapterProperty::Powered(v) => proxy.set(ADAPTER_INTERFACE, prop.name(), *v).await,
            AdapterProperty::Discoverable(v) => proxy.set(ADAPTER_INTERFACE, prop.name(), *v).await,
            AdapterProperty::Pairable(v) => proxy.set(ADAPTER_INTERFACE, prop.name(), *v).await,
            AdapterProperty::Alias(v) => proxy.set(ADAPTER_INTERFACE, prop.name(), v.clone()).await,
        }
    }

    async fn agent_manager_call<A>(&self, method: &str, args: A) -> Result<()>
    where
        A: dbus::arg::AppendAll,
    {
        self.proxy(BLUEZ_ROOT, CALL_TIMEOUT)
            .method_call::<(), _, _, _>(AGENT_MANAGER_INTERFACE, method, args)
            .await
            .map_err(|e| Error::operation_failed(method, BLUEZ_ROOT, describe(&e)))
    }
}

#[async_trait]
impl Gateway for BluezGateway {
    async fn snapshot(&self) -> Result<ObjectTree> {
        let objects = self
            .proxy("/", CALL_TIMEOUT)
            .get_managed_objects()
            .await
            .map_err(|e| Error::GatewayUnavailable(describe(&e)))?;

        Ok(objects
            .into_iter()
            .map(|(path, interfaces)| {
                let interfaces = interfaces
                    .into_iter()
                    .map(|(name, props)| (name, convert::property_map(&props)))
                    .collect();
                (path.to_string(), interfaces)
            })
            .collect())
    }

    async fn call(&self, command: &Command) -> Result<()> {
        tracing::debug!("Calling {} on {:?}", command, command.device_path());

        let result = match command {
            Command::StartDiscovery => {
                self.proxy(&self.adapter, CALL_TIMEOUT)
                    .method_call::<(), _, _, _>(ADAPTER_INTERFACE, "StartDiscovery", ())
                    .await
            }
            Command::StopDiscovery => {
                self.proxy(&self.adapter, CALL_TIMEOUT)
                    .method_call::<(), _, _, _>(ADAPTER_INTERFACE, "StopDiscovery", ())
                    .await
            }
            Command::Pair(path) => {
                self.proxy(path, PAIR_TIMEOUT)
                    .method_call::<(), _, _, _>(DEVICE_INTERFACE, "Pair", ())
                    .await
            }
            Command::Trust(path) => {
                self.proxy(path, CALL_TIMEOUT)
                    .set(DEVICE_INTERFACE, "Trusted", true)
                    .await
            }
            Command::Connect(path) => {
                self.proxy(path, CONNECT_TIMEOUT)
                    .method_call::<(), _, _, _>(DEVICE_INTERFACE, "Connect", ())
                    .await
            }
            Command::Disconnect(path) => {
                self.proxy(path, CONNECT_TIMEOUT)
                    .method_call::<(), _, _, _>(DEVICE_INTERFACE, "Disconnect", ())
                    .await
            }
            Command::RemoveDevice(path) => {
                let device = object_path(path)?;
                self.proxy(&self.adapter, CALL_TIMEOUT)
                    .method_call::<(), _, _, _>(ADAPTER_INTERFACE, "RemoveDevice", (device,))
                    .await
            }
            Command::SetAdapter(prop) => self.set_adapter(prop).await,
        };

        result.map_err(|e| {
            let target = command.device_path().unwrap_or(&self.adapter);
            tracing::warn!("{} on {} failed: {}", command, target, describe(&e));
            Error::operation_failed(command.verb(), target, describe(&e))
        })
    }

    async fn get_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Option<PropValue>> {
        let reply = self
            .proxy(path, CALL_TIMEOUT)
            .method_call::<(Variant<Box<dyn RefArg>>,), _, _, _>(
                PROPERTIES_INTERFACE,
                "Get",
                (interface, name),
            )
            .await;

        match reply {
            Ok((value,)) => Ok(Some(convert::prop_value(&value))),
            Err(e) if e.name() == Some(INVALID_ARGS) => Ok(None),
            Err(e) => Err(Error::operation_failed("get property", path, describe(&e))),
        }
    }

    fn adapter_path(&self) -> &str {
        &self.adapter
    }
}

#[async_trait]
impl AgentManager for BluezGateway {
    async fn register_agent(&self, path: &str, capability: Capability) -> Result<()> {
        self.agent_manager_call("RegisterAgent", (object_path(path)?, capability.as_str()))
            .await
    }

    async fn unregister_agent(&self, path: &str) -> Result<()> {
        self.agent_manager_call("UnregisterAgent", (object_path(path)?,))
            .await
    }

    async fn request_default_agent(&self, path: &str) -> Result<()> {
        self.agent_manager_call("RequestDefaultAgent", (object_path(path)?,))
            .await
    }
}

fn object_path(path: &str) -> Result<Path<'static>> {
    Path::new(path.to_string()).map_err(|e| Error::operation_failed("resolve path", path, e))
}

fn describe(err: &dbus::Error) -> String {
    match (err.name(), err.message()) {
        (Some(name), Some(message)) if !message.is_empty() => format!("{} ({})", message, name),
        (Some(name), _) => name.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => "unknown D-Bus error".to_string(),
    }
}
