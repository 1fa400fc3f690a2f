//! GATT Registry
//!
//! UUID representation, characteristic property bits and the handle registry
//! that maps stack-assigned attribute handles back to registered
//! characteristics. Sized for nRF52820 constraints: no heap, fixed capacity.

use core::fmt;

use heapless::index_map::FnvIndexMap;

use crate::config::MAX_CHARACTERISTICS;
use crate::error::{Error, Result};

/// Stack-assigned attribute handle.
pub type AttrHandle = u16;

/// Characteristic properties (matches BLE specification)
pub mod char_properties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTH_SIGNED_WRITES: u8 = 0x40;
    pub const EXTENDED_PROPERTIES: u8 = 0x80;

    /// Central can write the value (with or without response).
    pub const fn is_writable(properties: u8) -> bool {
        properties & (WRITE | WRITE_WITHOUT_RESPONSE) != 0
    }

    /// Value changes can be pushed to subscribed centrals.
    pub const fn is_notifiable(properties: u8) -> bool {
        properties & (NOTIFY | INDICATE) != 0
    }
}

/// BLE UUID representation
///
/// 128-bit UUIDs are stored in the byte order the stack expects on air
/// (little-endian), so they can be copied into AD structures and
/// registration calls as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleUuid {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

impl BleUuid {
    /// Build a 128-bit UUID from its numeric value
    /// (`0x0bfc2787_e220_4b0f_ae98_13731add0000` for the textual form
    /// `0bfc2787-e220-4b0f-ae98-13731add0000`).
    pub const fn from_u128(value: u128) -> Self {
        BleUuid::Uuid128(value.to_le_bytes())
    }

    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self::from_u128(uuid.as_u128())
    }

    /// Parse either a 16-bit UUID (`"180f"`, `"0x180F"`) or a hyphenated /
    /// simple 128-bit UUID string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let short = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if short.len() == 4 {
            return u16::from_str_radix(short, 16)
                .map(BleUuid::Uuid16)
                .map_err(|_| Error::InvalidUuid);
        }

        uuid::Uuid::parse_str(s)
            .map(Self::from_uuid)
            .map_err(|_| Error::InvalidUuid)
    }

    /// Number of bytes the UUID occupies on air.
    pub const fn byte_len(&self) -> usize {
        match self {
            BleUuid::Uuid16(_) => 2,
            BleUuid::Uuid128(_) => 16,
        }
    }

    /// Copy the on-air (little-endian) bytes into `out`, returning the
    /// number of bytes written, or `None` if `out` is too small.
    pub fn write_le_bytes(&self, out: &mut [u8]) -> Option<usize> {
        let len = self.byte_len();
        let dst = out.get_mut(..len)?;
        match self {
            BleUuid::Uuid16(v) => dst.copy_from_slice(&v.to_le_bytes()),
            BleUuid::Uuid128(bytes) => dst.copy_from_slice(bytes),
        }
        Some(len)
    }
}

impl From<uuid::Uuid> for BleUuid {
    fn from(uuid: uuid::Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleUuid::Uuid16(v) => write!(f, "0x{:04x}", v),
            BleUuid::Uuid128(bytes) => {
                fmt::Display::fmt(&uuid::Uuid::from_u128(u128::from_le_bytes(*bytes)), f)
            }
        }
    }
}

impl fmt::Debug for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BleUuid({})", self)
    }
}

/// Position of a registered characteristic: service slot and characteristic
/// slot within that service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharRef {
    pub service: u8,
    pub characteristic: u8,
}

/// Attribute handle -> characteristic lookup, filled as services register.
///
/// Entries are never removed: services cannot be unregistered.
pub struct HandleRegistry {
    handles: FnvIndexMap<AttrHandle, CharRef, MAX_CHARACTERISTICS>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            handles: FnvIndexMap::new(),
        }
    }

    /// Record the owner of `handle`.
    pub fn insert(&mut self, handle: AttrHandle, char_ref: CharRef) -> Result<()> {
        match self.handles.insert(handle, char_ref) {
            Ok(Some(previous)) => {
                warn!(
                    "GATT: handle {} re-assigned (was {:?}, now {:?})",
                    handle, previous, char_ref
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => {
                error!("GATT: handle registry full, cannot map handle {}", handle);
                Err(Error::HandleRegistryFull)
            }
        }
    }

    /// Resolve a handle to its characteristic.
    pub fn resolve(&self, handle: AttrHandle) -> Option<CharRef> {
        self.handles.get(&handle).copied()
    }

    pub fn contains(&self, handle: AttrHandle) -> bool {
        self.handles.contains_key(&handle)
    }

    /// Whether `additional` more handles still fit.
    pub fn has_room_for(&self, additional: usize) -> bool {
        self.handles.len() + additional <= MAX_CHARACTERISTICS
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttrHandle, CharRef)> + '_ {
        self.handles.iter().map(|(h, r)| (*h, *r))
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
