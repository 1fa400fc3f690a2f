#![cfg_attr(not(test), no_std)]

//! BLE peripheral manager and channel router for nRF52820 + S140
//!
//! - `ble`: advertising, GATT model, connection tracking and the event
//!   dispatcher, on top of the [`Radio`](ble::radio::Radio) trait
//! - `protocol` / `router`: `channel:data;...` commands written to one
//!   characteristic, fanned out to per-channel handlers
//! - `ranger`: the two pieces composed into one ready-made service
//!
//! Everything here is heapless and hardware independent; the firmware binary
//! supplies a SoftDevice backed radio.

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod protocol;
pub mod ranger;
pub mod router;

pub use ble::events::BleEvent;
pub use ble::manager::PeripheralManager;
pub use ble::radio::Radio;
pub use ble::registry::BleUuid;
pub use config::{PeripheralConfig, RangerConfig};
pub use error::{Error, Result};
pub use ranger::BleRanger;
pub use router::{ChannelHandler, ChannelRouter};
