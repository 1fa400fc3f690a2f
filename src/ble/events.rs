//! BLE Event Model
//!
//! The closed set of radio events the peripheral reacts to, plus decoding of
//! the stack's raw interrupt codes into that set.

use crate::ble::connection::ConnHandle;
use crate::ble::registry::AttrHandle;

/// Raw interrupt codes delivered by the radio stack.
pub mod irq {
    pub const CENTRAL_CONNECT: u8 = 1;
    pub const CENTRAL_DISCONNECT: u8 = 2;
    pub const GATTS_WRITE: u8 = 3;
}

/// BLE event types the peripheral manager dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleEvent {
    /// A central connected.
    Connected { conn_handle: ConnHandle },
    /// A central disconnected (HCI reason code, 0 if unknown).
    Disconnected { conn_handle: ConnHandle, reason: u8 },
    /// A central wrote an attribute; the value is read back from the stack.
    GattsWrite {
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
    },
}

impl BleEvent {
    /// Decode a raw stack event.
    ///
    /// `data` is the event tuple: `(conn_handle, ...)` for connect and
    /// disconnect, `(conn_handle, attr_handle)` for writes. Unknown codes and
    /// short tuples yield `None`.
    pub fn from_irq(code: u8, data: &[u16]) -> Option<Self> {
        let event = match code {
            irq::CENTRAL_CONNECT => BleEvent::Connected {
                conn_handle: *data.first()?,
            },
            irq::CENTRAL_DISCONNECT => BleEvent::Disconnected {
                conn_handle: *data.first()?,
                reason: 0,
            },
            irq::GATTS_WRITE => BleEvent::GattsWrite {
                conn_handle: *data.first()?,
                attr_handle: *data.get(1)?,
            },
            _ => {
                trace!("EVENT: ignoring irq {}", code);
                return None;
            }
        };
        Some(event)
    }

    /// Connection the event belongs to.
    pub fn conn_handle(&self) -> ConnHandle {
        match self {
            BleEvent::Connected { conn_handle }
            | BleEvent::Disconnected { conn_handle, .. }
            | BleEvent::GattsWrite { conn_handle, .. } => *conn_handle,
        }
    }
}

/// Create a Connected event
pub fn create_connected_event(conn_handle: ConnHandle) -> BleEvent {
    BleEvent::Connected { conn_handle }
}

/// Create a Disconnected event
pub fn create_disconnected_event(conn_handle: ConnHandle, reason: u8) -> BleEvent {
    BleEvent::Disconnected { conn_handle, reason }
}

/// Create a GATT Write event
pub fn create_gatts_write_event(conn_handle: ConnHandle, attr_handle: AttrHandle) -> BleEvent {
    BleEvent::GattsWrite {
        conn_handle,
        attr_handle,
    }
}
