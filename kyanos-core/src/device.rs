/*!
 * Bluetooth Device Model
 * Normalizes raw daemon property maps into Device records
 */

use chrono::{DateTime, Utc};

use crate::gateway::{InterfaceMap, PropertyMap, BATTERY_INTERFACE, DEVICE_INTERFACE};

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub path: String,
    pub address: String,
    pub raw_name: String,
    pub alias: String,
    pub paired: bool,
    pub trusted: bool,
    pub connected: bool,
    /// 0 means the daemon did not report a signal strength.
    pub rssi: i16,
    pub class: u32,
    pub icon: String,
    pub battery: Option<u8>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Audio,
    Phone,
    Computer,
    Keyboard,
    Mouse,
    Gaming,
    Camera,
    Printer,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryCategory {
    High,
    Medium,
    Low,
}

/// Strips `:`/`-` separators and lowercases hex letters.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Canonical registry key: upper-case, colon-separated when the input is a 48-bit address.
pub fn canonical_address(address: &str) -> String {
    let bare = normalize_mac(address);
    if bare.len() == 12 && bare.chars().all(|c| c.is_ascii_hexdigit()) {
        bare.as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(":")
    } else {
        address.to_ascii_uppercase()
    }
}

/// True when `alias` is only the hardware address written with other separators or case.
pub fn is_alias_mac_address(alias: &str, address: &str) -> bool {
    let plausible = |s: &str| s.len() == 17 || s.len() == 12;
    if !plausible(alias) || !plausible(address) {
        return false;
    }
    normalize_mac(alias) == normalize_mac(address)
}

/// Builds a Device from one object's interfaces. Missing or mistyped fields keep their zero value.
pub fn parse_device(path: &str, interfaces: &InterfaceMap, seen_at: DateTime<Utc>) -> Option<Device> {
    let props = interfaces.get(DEVICE_INTERFACE)?;

    let battery = interfaces
        .get(BATTERY_INTERFACE)
        .and_then(|battery| battery.get("Percentage"))
        .and_then(|v| v.as_byte())
        .map(|level| level.min(100));

    Some(Device {
        path: path.to_string(),
        address: canonical_address(&string_prop(props, "Address")),
        raw_name: string_prop(props, "Name"),
        alias: string_prop(props, "Alias"),
        paired: bool_prop(props, "Paired"),
        trusted: bool_prop(props, "Trusted"),
        connected: bool_prop(props, "Connected"),
        rssi: props.get("RSSI").and_then(|v| v.as_i16()).unwrap_or(0),
        class: props.get("Class").and_then(|v| v.as_u32()).unwrap_or(0),
        icon: string_prop(props, "Icon"),
        battery,
        last_seen: seen_at,
    })
}

pub(crate) fn string_prop(props: &PropertyMap, key: &str) -> String {
    props
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn bool_prop(props: &PropertyMap, key: &str) -> bool {
    props.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

impl Device {
    /// Name > Alias > address.
    pub fn display_name(&self) -> &str {
        if !self.raw_name.is_empty() {
            &self.raw_name
        } else if !self.alias.is_empty() {
            &self.alias
        } else {
            &self.address
        }
    }

    pub fn has_real_name(&self) -> bool {
        if !self.raw_name.is_empty() {
            return true;
        }
        !self.alias.is_empty() && !is_alias_mac_address(&self.alias, &self.address)
    }

    pub fn kind(&self) -> DeviceKind {
        match self.icon.as_str() {
            "audio-card" | "audio-headset" | "audio-headphones" => return DeviceKind::Audio,
            "phone" | "smartphone" => return DeviceKind::Phone,
            "computer" | "laptop" => return DeviceKind::Computer,
            "input-keyboard" => return DeviceKind::Keyboard,
            "input-mouse" => return DeviceKind::Mouse,
            "input-gaming" => return DeviceKind::Gaming,
            "camera" => return DeviceKind::Camera,
            "printer" => return DeviceKind::Printer,
            _ => {}
        }

        // Major device class, bits 8..12 of the class-of-device field
        match (self.class >> 8) & 0x1F {
            1 => DeviceKind::Computer,
            2 => DeviceKind::Phone,
            4 => DeviceKind::Audio,
            5 => DeviceKind::Keyboard,
            6 => DeviceKind::Camera,
            _ => DeviceKind::Generic,
        }
    }

    pub fn battery_category(&self, high: u8, low: u8) -> Option<BatteryCategory> {
        self.battery.map(|level| {
            if level >= high {
                BatteryCategory::High
            } else if level >= low {
                BatteryCategory::Medium
            } else {
                BatteryCategory::Low
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::PropValue;

    pub(crate) fn device_props(address: &str, name: &str, alias: &str) -> InterfaceMap {
        let mut props = PropertyMap::new();
        props.insert("Address".into(), PropValue::Str(address.into()));
        if !name.is_empty() {
            props.insert("Name".into(), PropValue::Str(name.into()));
        }
        if !alias.is_empty() {
            props.insert("Alias".into(), PropValue::Str(alias.into()));
        }
        let mut ifaces = InterfaceMap::new();
        ifaces.insert(DEVICE_INTERFACE.into(), props);
        ifaces
    }

    #[test]
    fn address_is_stable_across_snapshots() {
        let mut first = device_props("aa:bb:cc:dd:ee:ff", "Headset", "");
        let mut second = device_props("AA:BB:CC:DD:EE:FF", "", "Renamed");
        second
            .get_mut(DEVICE_INTERFACE)
            .unwrap()
            .insert("Connected".into(), PropValue::Bool(true));
        first
            .get_mut(DEVICE_INTERFACE)
            .unwrap()
            .insert("RSSI".into(), PropValue::I16(-50));

        let a = parse_device("/dev_a", &first, Utc::now()).unwrap();
        let b = parse_device("/dev_a", &second, Utc::now()).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn missing_fields_keep_zero_values() {
        let dev = parse_device("/dev", &device_props("11:22:33:44:55:66", "", ""), Utc::now()).unwrap();
        assert_eq!(dev.raw_name, "");
        assert!(!dev.paired && !dev.trusted && !dev.connected);
        assert_eq!(dev.rssi, 0);
        assert_eq!(dev.class, 0);
        assert_eq!(dev.battery, None);
    }

    #[test]
    fn mistyped_fields_are_ignored() {
        let mut ifaces = device_props("11:22:33:44:55:66", "Speaker", "");
        let props = ifaces.get_mut(DEVICE_INTERFACE).unwrap();
        props.insert("Paired".into(), PropValue::Str("yes".into()));
        props.insert("RSSI".into(), PropValue::U32(7));
        let dev = parse_device("/dev", &ifaces, Utc::now()).unwrap();
        assert!(!dev.paired);
        assert_eq!(dev.rssi, 0);
        assert_eq!(dev.raw_name, "Speaker");
    }

    #[test]
    fn objects_without_device_interface_are_skipped() {
        assert!(parse_device("/org/bluez/hci0", &InterfaceMap::new(), Utc::now()).is_none());
    }

    #[test]
    fn battery_comes_from_battery_interface() {
        let mut ifaces = device_props("11:22:33:44:55:66", "Mouse", "");
        let mut battery = PropertyMap::new();
        battery.insert("Percentage".into(), PropValue::Byte(0));
        ifaces.insert(BATTERY_INTERFACE.into(), battery);
        let dev = parse_device("/dev", &ifaces, Utc::now()).unwrap();
        // 0% is a reading, not an absence
        assert_eq!(dev.battery, Some(0));
        assert_eq!(dev.battery_category(60, 30), Some(BatteryCategory::Low));
    }

    #[test]
    fn battery_buckets() {
        let mut dev = parse_device("/dev", &device_props("11:22:33:44:55:66", "", ""), Utc::now()).unwrap();
        assert_eq!(dev.battery_category(60, 30), None);
        dev.battery = Some(60);
        assert_eq!(dev.battery_category(60, 30), Some(BatteryCategory::High));
        dev.battery = Some(59);
        assert_eq!(dev.battery_category(60, 30), Some(BatteryCategory::Medium));
        dev.battery = Some(30);
        assert_eq!(dev.battery_category(60, 30), Some(BatteryCategory::Medium));
        dev.battery = Some(29);
        assert_eq!(dev.battery_category(60, 30), Some(BatteryCategory::Low));
    }

    #[test]
    fn display_name_priority() {
        let now = Utc::now();
        let named = parse_device("/d", &device_props("AA:BB:CC:DD:EE:FF", "Name", "Alias"), now).unwrap();
        assert_eq!(named.display_name(), "Name");
        let aliased = parse_device("/d", &device_props("AA:BB:CC:DD:EE:FF", "", "Alias"), now).unwrap();
        assert_eq!(aliased.display_name(), "Alias");
        let bare = parse_device("/d", &device_props("AA:BB:CC:DD:EE:FF", "", ""), now).unwrap();
        assert_eq!(bare.display_name(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn alias_encoding_the_address_is_not_a_real_name() {
        assert!(is_alias_mac_address("aa-bb-cc-dd-ee-ff", "AA:BB:CC:DD:EE:FF"));
        assert!(is_alias_mac_address("AABBCCDDEEFF", "AA:BB:CC:DD:EE:FF"));
        assert!(is_alias_mac_address("AA:BB:CC:DD:EE:FF", "aa-bb-cc-dd-ee-ff"));
        assert!(!is_alias_mac_address("My Headphones", "AA:BB:CC:DD:EE:FF"));
        assert!(!is_alias_mac_address("AA:BB:CC:DD:EE:00", "AA:BB:CC:DD:EE:FF"));
        assert!(!is_alias_mac_address("AA-BB-CC-DD-EE", "AA:BB:CC:DD:EE:FF"));

        let dev = parse_device(
            "/d",
            &device_props("AA:BB:CC:DD:EE:FF", "", "aa-bb-cc-dd-ee-ff"),
            Utc::now(),
        )
        .unwrap();
        assert!(!dev.has_real_name());

        let dev = parse_device("/d", &device_props("AA:BB:CC:DD:EE:FF", "", "Keyboard"), Utc::now()).unwrap();
        assert!(dev.has_real_name());
    }

    #[test]
    fn canonical_address_forms() {
        assert_eq!(canonical_address("aa-bb-cc-dd-ee-ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(canonical_address("aabbccddeeff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(canonical_address("not-an-address"), "NOT-AN-ADDRESS");
    }

    #[test]
    fn kind_prefers_icon_then_class() {
        let mut dev = parse_device("/d", &device_props("AA:BB:CC:DD:EE:FF", "", ""), Utc::now()).unwrap();
        dev.icon = "input-gaming".into();
        dev.class = 0x200404;
        assert_eq!(dev.kind(), DeviceKind::Gaming);
        dev.icon.clear();
        assert_eq!(dev.kind(), DeviceKind::Audio);
        dev.class = 0;
        assert_eq!(dev.kind(), DeviceKind::Generic);
    }
}
