use dbus::arg::{ArgType, PropMap, RefArg, Variant};

use crate::gateway::{PropValue, PropertyMap};

pub(super) fn property_map(props: &PropMap) -> PropertyMap {
    props
        .iter()
        .map(|(name, value)| (name.clone(), prop_value(value)))
        .collect()
}

/// Keeps the scalar types the registry reads; containers become `Other`.
pub(super) fn prop_value(value: &Variant<Box<dyn RefArg>>) -> PropValue {
    let inner: &dyn RefArg = &*value.0;
    let converted = match inner.arg_type() {
        ArgType::Boolean => inner.as_any().downcast_ref::<bool>().copied().map(PropValue::Bool),
        ArgType::String | ArgType::ObjectPath => {
            inner.as_str().map(|s| PropValue::Str(s.to_string()))
        }
        ArgType::Byte => inner.as_u64().map(|v| PropValue::Byte(v as u8)),
        ArgType::Int16 => inner.as_i64().map(|v| PropValue::I16(v as i16)),
        ArgType::UInt16 => inner.as_u64().map(|v| PropValue::U16(v as u16)),
        ArgType::UInt32 => inner.as_u64().map(|v| PropValue::U32(v as u32)),
        _ => None,
    };
    converted.unwrap_or(PropValue::Other)
}
