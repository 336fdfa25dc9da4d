/*!
 * Device Registry
 * Reconciles successive discovery polls into stable, ordered views
 */

use chrono::Utc;
use std::collections::HashMap;

use crate::device::{canonical_address, parse_device, Device};
use crate::gateway::ObjectTree;

/// Devices of one poll, keyed by canonical address.
pub type DeviceSnapshot = HashMap<String, Device>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub hide_unnamed: bool,
    pub min_rssi: i16,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            hide_unnamed: false,
            min_rssi: -100,
        }
    }
}

impl DeviceFilter {
    pub fn admits(&self, dev: &Device) -> bool {
        if self.hide_unnamed && dev.raw_name.is_empty() && dev.alias.is_empty() {
            return false;
        }
        // RSSI 0 means unknown and never filters
        if !dev.connected && dev.rssi != 0 && dev.rssi < self.min_rssi {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Available,
    Connected,
}

impl Focus {
    pub fn toggle(self) -> Self {
        match self {
            Focus::Available => Focus::Connected,
            Focus::Connected => Focus::Available,
        }
    }
}

/// Builds a snapshot from every object exposing the device interface.
pub fn snapshot_devices(tree: &ObjectTree) -> DeviceSnapshot {
    let seen_at = Utc::now();
    tree.iter()
        .filter_map(|(path, ifaces)| parse_device(path, ifaces, seen_at))
        .filter(|dev| !dev.address.is_empty())
        .map(|dev| (dev.address.clone(), dev))
        .collect()
}

/// Owned by the event loop. `order` records first-seen order and always holds
/// exactly the keys of `devices`.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
    order: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&Device> {
        self.devices.get(&canonical_address(address))
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Folds one poll in. Devices missing from `snapshot` stay until forgotten.
    pub fn merge(&mut self, snapshot: DeviceSnapshot) {
        for (address, mut fresh) in snapshot {
            match self.devices.get(&address) {
                Some(old) => {
                    if !old.connected && !fresh.connected {
                        fresh.last_seen = old.last_seen;
                    }
                }
                None => self.order.push(address.clone()),
            }
            self.devices.insert(address, fresh);
        }
    }

    pub fn forget(&mut self, address: &str) -> Option<Device> {
        let key = canonical_address(address);
        let removed = self.devices.remove(&key);
        self.order.retain(|known| *known != key);
        removed
    }

    /// Filtered devices in first-seen order, paired ones first.
    pub fn available(&self, filter: &DeviceFilter) -> Vec<&Device> {
        let visible: Vec<&Device> = self
            .order
            .iter()
            .filter_map(|address| self.devices.get(address))
            .filter(|dev| filter.admits(dev))
            .collect();

        // Two passes keep each group in insertion order
        let mut view: Vec<&Device> = visible.iter().copied().filter(|dev| dev.paired).collect();
        view.extend(visible.iter().copied().filter(|dev| !dev.paired));
        view
    }

    /// Connected devices, oldest `last_seen` first.
    pub fn connected(&self) -> Vec<&Device> {
        let mut view: Vec<&Device> = self
            .order
            .iter()
            .filter_map(|address| self.devices.get(address))
            .filter(|dev| dev.connected)
            .collect();
        view.sort_by_key(|dev| dev.last_seen);
        view
    }

    pub fn view(&self, focus: Focus, filter: &DeviceFilter) -> Vec<&Device> {
        match focus {
            Focus::Available => self.available(filter),
            Focus::Connected => self.connected(),
        }
    }

    pub fn select(&self, focus: Focus, index: usize, filter: &DeviceFilter) -> Option<&Device> {
        self.view(focus, filter).get(index).copied()
    }
}

/// Keeps a selection index inside a view of `len` entries.
pub fn clamp_selection(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}
