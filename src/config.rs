//! Compile-time capacities and runtime peripheral configuration.
//!
//! Capacities size the fixed-capacity tables; the runtime structs carry what
//! the application picks at boot.

// GAP

/// Longest device name that still fits a legacy scan response
/// (31 bytes minus the 2-byte AD header).
pub const MAX_DEVICE_NAME_LEN: usize = 29;

/// Legacy advertising PDU payload limit (BLE specification).
pub const LEGACY_ADV_DATA_LEN: usize = 31;

/// Maximum number of service UUIDs carried in the advertising payload.
pub const MAX_ADV_UUIDS: usize = 4;

/// Advertising interval in 0.625 ms units. 160 = 100 ms.
pub const DEFAULT_ADV_INTERVAL: u16 = 160;

/// Maximum number of simultaneous central connections.
/// Must be a power of two (index set capacity).
pub const MAX_CONNECTIONS: usize = 4;

// GATT

/// Maximum number of services we can register.
pub const MAX_SERVICES: usize = 8;

/// Maximum number of characteristics per service.
pub const MAX_CHARACTERISTICS_PER_SERVICE: usize = 8;

/// Maximum number of registered attribute handles across all services.
/// Must be a power of two (index map capacity).
pub const MAX_CHARACTERISTICS: usize = 32;

/// Characteristic value buffer size (cached value, notifications, writes).
pub const MAX_VALUE_LEN: usize = 64;

/// Depth of the outbound notification queue.
pub const NOTIFICATION_QUEUE_DEPTH: usize = 8;

// Channel router

/// Maximum number of registered channels. Must be a power of two.
pub const MAX_CHANNELS: usize = 16;

/// Peripheral configuration applied by [`PeripheralManager::new`].
///
/// [`PeripheralManager::new`]: crate::ble::manager::PeripheralManager::new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralConfig {
    /// Complete local name placed in the scan response.
    pub name: &'static str,
    /// Radio transmit power (dBm).
    pub tx_power: i8,
    /// Advertising interval (0.625 ms units).
    pub adv_interval: u16,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            name: "PicoW",
            tx_power: 0,
            adv_interval: DEFAULT_ADV_INTERVAL,
        }
    }
}

/// Configuration of the ranger peripheral (channel router over one service).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangerConfig {
    pub name: &'static str,
    pub tx_power: i8,
    pub adv_interval: u16,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            name: "ble-ranger",
            tx_power: 4,
            adv_interval: DEFAULT_ADV_INTERVAL,
        }
    }
}

impl From<RangerConfig> for PeripheralConfig {
    fn from(config: RangerConfig) -> Self {
        Self {
            name: config.name,
            tx_power: config.tx_power,
            adv_interval: config.adv_interval,
        }
    }
}
