//! BLE peripheral implementation
//!
//! GAP advertising, the GATT model and the connection-lifecycle dispatcher.
//! The radio stack itself sits behind [`radio::Radio`].

pub mod advertising;
pub mod connection;
pub mod events;
pub mod manager;
pub mod notifications;
pub mod radio;
pub mod registry;
pub mod services;
