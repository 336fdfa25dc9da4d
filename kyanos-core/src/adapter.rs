use crate::device::{bool_prop, string_prop};
use crate::gateway::{ObjectTree, PropertyMap, ADAPTER_INTERFACE};

/// The local radio. Replaced wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adapter {
    pub path: String,
    pub address: String,
    pub name: String,
    pub alias: String,
    pub powered: bool,
    pub discoverable: bool,
    pub pairable: bool,
    pub discovering: bool,
}

impl Adapter {
    pub fn from_properties(path: &str, props: &PropertyMap) -> Self {
        Self {
            path: path.to_string(),
            address: string_prop(props, "Address"),
            name: string_prop(props, "Name"),
            alias: string_prop(props, "Alias"),
            powered: bool_prop(props, "Powered"),
            discoverable: bool_prop(props, "Discoverable"),
            pairable: bool_prop(props, "Pairable"),
            discovering: bool_prop(props, "Discovering"),
        }
    }

    /// Alias > Name > address.
    pub fn display_name(&self) -> &str {
        if !self.alias.is_empty() {
            &self.alias
        } else if !self.name.is_empty() {
            &self.name
        } else {
            &self.address
        }
    }
}

/// Picks the adapter at `path` out of a snapshot, or the first adapter when `path` is `None`.
pub fn find_adapter(tree: &ObjectTree, path: Option<&str>) -> Option<Adapter> {
    match path {
        Some(path) => tree
            .get(path)
            .and_then(|ifaces| ifaces.get(ADAPTER_INTERFACE))
            .map(|props| Adapter::from_properties(path, props)),
        None => {
            // Lowest path first so hci0 wins over hci1
            let mut paths: Vec<&String> = tree
                .iter()
                .filter(|(_, ifaces)| ifaces.contains_key(ADAPTER_INTERFACE))
                .map(|(path, _)| path)
                .collect();
            paths.sort();
            paths.first().and_then(|path| find_adapter(tree, Some(path.as_str())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InterfaceMap, PropValue};

    fn adapter_tree() -> ObjectTree {
        let mut props = PropertyMap::new();
        props.insert("Address".into(), PropValue::Str("00:1A:7D:DA:71:13".into()));
        props.insert("Name".into(), PropValue::Str("laptop".into()));
        props.insert("Powered".into(), PropValue::Bool(true));
        props.insert("Discovering".into(), PropValue::Bool(true));
        let mut ifaces = InterfaceMap::new();
        ifaces.insert(ADAPTER_INTERFACE.into(), props);

        let mut tree = ObjectTree::new();
        tree.insert("/org/bluez/hci1".into(), ifaces.clone());
        tree.insert("/org/bluez/hci0".into(), ifaces);
        tree.insert("/org/bluez".into(), InterfaceMap::new());
        tree
    }

    #[test]
    fn first_adapter_is_lowest_path() {
        let adapter = find_adapter(&adapter_tree(), None).unwrap();
        assert_eq!(adapter.path, "/org/bluez/hci0");
        assert!(adapter.powered && adapter.discovering);
        assert!(!adapter.pairable);
    }

    #[test]
    fn no_adapter_in_tree() {
        assert!(find_adapter(&ObjectTree::new(), None).is_none());
        assert!(find_adapter(&adapter_tree(), Some("/org/bluez")).is_none());
    }

    #[test]
    fn display_name_prefers_alias() {
        let mut adapter = find_adapter(&adapter_tree(), None).unwrap();
        assert_eq!(adapter.display_name(), "laptop");
        adapter.alias = "desk".into();
        assert_eq!(adapter.display_name(), "desk");
        adapter.alias.clear();
        adapter.name.clear();
        assert_eq!(adapter.display_name(), "00:1A:7D:DA:71:13");
    }
}
