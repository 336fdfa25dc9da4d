/*!
 * Adapter Gateway
 * Transport-neutral view of the daemon's object tree and its verbs
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const BATTERY_INTERFACE: &str = "org.bluez.Battery1";

/// A single property value as reported by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Str(String),
    Byte(u8),
    I16(i16),
    U16(u16),
    U32(u32),
    Other,
}

impl PropValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            PropValue::I16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            PropValue::Byte(v) => Some(*v),
            _ => None,
        }
    }
}

pub type PropertyMap = HashMap<String, PropValue>;
pub type InterfaceMap = HashMap<String, PropertyMap>;
pub type ObjectTree = HashMap<String, InterfaceMap>;

#[derive(Debug, Clone, PartialEq)]
pub enum AdapterProperty {
    Powered(bool),
    Discoverable(bool),
    Pairable(bool),
    Alias(String),
}

impl AdapterProperty {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterProperty::Powered(_) => "Powered",
            AdapterProperty::Discoverable(_) => "Discoverable",
            AdapterProperty::Pairable(_) => "Pairable",
            AdapterProperty::Alias(_) => "Alias",
        }
    }
}

/// Imperative verbs the daemon understands. Device verbs carry the device's object path.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartDiscovery,
    StopDiscovery,
    Pair(String),
    Trust(String),
    Connect(String),
    Disconnect(String),
    RemoveDevice(String),
    SetAdapter(AdapterProperty),
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::StartDiscovery => "start discovery",
            Command::StopDiscovery => "stop discovery",
            Command::Pair(_) => "pair",
            Command::Trust(_) => "trust",
            Command::Connect(_) => "connect",
            Command::Disconnect(_) => "disconnect",
            Command::RemoveDevice(_) => "remove",
            Command::SetAdapter(_) => "set adapter property",
        }
    }

    /// Device object path for device verbs, `None` for adapter verbs.
    pub fn device_path(&self) -> Option<&str> {
        match self {
            Command::Pair(path)
            | Command::Trust(path)
            | Command::Connect(path)
            | Command::Disconnect(path)
            | Command::RemoveDevice(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetAdapter(prop) => write!(f, "set {}", prop.name()),
            other => f.write_str(other.verb()),
        }
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Full dump of the daemon's managed objects.
    async fn snapshot(&self) -> Result<ObjectTree>;

    async fn call(&self, command: &Command) -> Result<()>;

    async fn get_property(&self, path: &str, interface: &str, name: &str)
        -> Result<Option<PropValue>>;

    /// Object path of the adapter this gateway manages.
    fn adapter_path(&self) -> &str;
}
