//! In-memory gateway and fixtures for the orchestrator tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use kyanos_core::gateway::{
    InterfaceMap, ObjectTree, PropValue, PropertyMap, ADAPTER_INTERFACE, DEVICE_INTERFACE,
};
use kyanos_core::{Command, Device, Error, Gateway, Result};

pub const ADAPTER_PATH: &str = "/org/bluez/hci0";

pub fn device_path(address: &str) -> String {
    format!("{}/dev_{}", ADAPTER_PATH, address.replace(':', "_"))
}

pub fn device(address: &str, paired: bool, connected: bool) -> Device {
    Device {
        path: device_path(address),
        address: address.to_string(),
        raw_name: String::new(),
        alias: address.replace(':', "-"),
        paired,
        trusted: false,
        connected,
        rssi: -60,
        class: 0,
        icon: String::new(),
        battery: None,
        last_seen: Utc::now(),
    }
}

pub struct FakeGateway {
    tree: Mutex<ObjectTree>,
    calls: Mutex<Vec<Command>>,
    failing: Mutex<Vec<&'static str>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        let mut adapter = PropertyMap::new();
        adapter.insert("Address".into(), PropValue::Str("00:1A:7D:DA:71:13".into()));
        adapter.insert("Name".into(), PropValue::Str("desk".into()));
        adapter.insert("Powered".into(), PropValue::Bool(true));
        adapter.insert("Discovering".into(), PropValue::Bool(false));

        let mut interfaces = InterfaceMap::new();
        interfaces.insert(ADAPTER_INTERFACE.into(), adapter);

        let mut tree = HashMap::new();
        tree.insert(ADAPTER_PATH.to_string(), interfaces);

        Self {
            tree: Mutex::new(tree),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGateway {
    pub fn fail(&self, verb: &'static str) {
        self.failing.lock().unwrap().push(verb);
    }

    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_discovering(&self, discovering: bool) {
        let mut tree = self.tree.lock().unwrap();
        if let Some(adapter) = tree
            .get_mut(ADAPTER_PATH)
            .and_then(|ifaces| ifaces.get_mut(ADAPTER_INTERFACE))
        {
            adapter.insert("Discovering".into(), PropValue::Bool(discovering));
        }
    }

    pub fn add_device(&self, address: &str, name: &str) {
        let mut props = PropertyMap::new();
        props.insert("Address".into(), PropValue::Str(address.into()));
        props.insert("Name".into(), PropValue::Str(name.into()));
        props.insert("RSSI".into(), PropValue::I16(-50));

        let mut interfaces = InterfaceMap::new();
        interfaces.insert(DEVICE_INTERFACE.into(), props);
        self.tree
            .lock()
            .unwrap()
            .insert(device_path(address), interfaces);
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn snapshot(&self) -> Result<ObjectTree> {
        Ok(self.tree.lock().unwrap().clone())
    }

    async fn call(&self, command: &Command) -> Result<()> {
        self.calls.lock().unwrap().push(command.clone());
        if self.failing.lock().unwrap().contains(&command.verb()) {
            let target = command.device_path().unwrap_or(ADAPTER_PATH);
            return Err(Error::operation_failed(
                command.verb(),
                target,
                "org.bluez.Error.Failed",
            ));
        }
        Ok(())
    }

    async fn get_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Option<PropValue>> {
        Ok(self
            .tree
            .lock()
            .unwrap()
            .get(path)
            .and_then(|ifaces| ifaces.get(interface))
            .and_then(|props| props.get(name))
            .cloned())
    }

    fn adapter_path(&self) -> &str {
        ADAPTER_PATH
    }
}
