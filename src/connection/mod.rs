// Connection module - device status shared between threads

pub mod status;

pub use status::{AtomicDeviceStatus, DeviceStatus};
