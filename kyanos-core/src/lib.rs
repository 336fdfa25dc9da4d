/*!
 * KYANOS Core
 * Bluetooth device registry, pairing agent and BlueZ gateway
 */

pub mod adapter;
pub mod agent;
pub mod bluez;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod gateway;
pub mod registry;

pub use adapter::Adapter;
pub use agent::{PairingCoordinator, PairingExchange, Resolution};
pub use config::Config;
pub use device::{Device, DeviceKind};
pub use error::{Error, Result};
pub use events::{CoreEvent, Operation};
pub use gateway::{AdapterProperty, Command, Gateway};
pub use registry::{DeviceFilter, DeviceRegistry, Focus};
