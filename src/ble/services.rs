//! GATT service model
//!
//! Passive holders for services and characteristics before and after
//! registration. The [`PeripheralManager`] assigns handles; the notify path
//! updates cached values.
//!
//! [`PeripheralManager`]: crate::ble::manager::PeripheralManager

use heapless::Vec;

use crate::ble::connection::ConnHandle;
use crate::ble::registry::{char_properties, AttrHandle, BleUuid};
use crate::config::{MAX_CHARACTERISTICS_PER_SERVICE, MAX_VALUE_LEN};
use crate::error::{Error, HandlerError, Result};

/// Cached characteristic value.
pub type Value = Vec<u8, MAX_VALUE_LEN>;

/// Reacts to a central writing a characteristic.
///
/// Runs inside the radio event dispatcher: keep it short and never block.
/// Errors are logged by the dispatcher and go no further.
pub trait WriteHandler {
    fn on_write(
        &self,
        conn_handle: ConnHandle,
        characteristic: &Characteristic<'_>,
        value: &[u8],
    ) -> Result<(), HandlerError>;
}

impl<F> WriteHandler for F
where
    F: Fn(ConnHandle, &Characteristic<'_>, &[u8]) -> Result<(), HandlerError>,
{
    fn on_write(
        &self,
        conn_handle: ConnHandle,
        characteristic: &Characteristic<'_>,
        value: &[u8],
    ) -> Result<(), HandlerError> {
        self(conn_handle, characteristic, value)
    }
}

/// Shape of a characteristic as submitted to the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicDef {
    pub uuid: BleUuid,
    pub properties: u8,
}

pub struct Characteristic<'a> {
    uuid: BleUuid,
    properties: u8,
    handle: Option<AttrHandle>,
    value: Value,
    write_handler: Option<&'a dyn WriteHandler>,
}

impl<'a> Characteristic<'a> {
    /// Create a characteristic. `properties` is a mask of
    /// [`char_properties`] bits and must not be empty.
    pub fn new(uuid: BleUuid, properties: u8) -> Result<Self> {
        if properties == 0 {
            return Err(Error::InvalidProperties);
        }

        Ok(Self {
            uuid,
            properties,
            handle: None,
            value: Vec::new(),
            write_handler: None,
        })
    }

    /// Attach the handler invoked when a central writes this characteristic.
    pub fn with_write_handler(mut self, handler: &'a dyn WriteHandler) -> Self {
        if !char_properties::is_writable(self.properties) {
            warn!(
                "GATT: write handler on {:?} which is not writable (props 0x{:x})",
                self.uuid, self.properties
            );
        }
        self.write_handler = Some(handler);
        self
    }

    /// Set the value the characteristic starts with.
    pub fn with_initial_value(mut self, value: &[u8]) -> Result<Self> {
        self.set_value(value)?;
        Ok(self)
    }

    pub fn uuid(&self) -> BleUuid {
        self.uuid
    }

    pub fn properties(&self) -> u8 {
        self.properties
    }

    /// Attribute handle, `None` until the owning service is registered.
    pub fn handle(&self) -> Option<AttrHandle> {
        self.handle
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn set_value(&mut self, value: &[u8]) -> Result<()> {
        self.value = Vec::from_slice(value).map_err(|_| Error::ValueTooLarge)?;
        Ok(())
    }

    pub fn write_handler(&self) -> Option<&'a dyn WriteHandler> {
        self.write_handler
    }

    pub fn def(&self) -> CharacteristicDef {
        CharacteristicDef {
            uuid: self.uuid,
            properties: self.properties,
        }
    }

    pub(crate) fn assign_handle(&mut self, handle: AttrHandle) {
        self.handle = Some(handle);
    }
}

impl core::fmt::Debug for Characteristic<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("properties", &self.properties)
            .field("handle", &self.handle)
            .field("value_len", &self.value.len())
            .field("has_write_handler", &self.write_handler.is_some())
            .finish()
    }
}

/// A GATT service: UUID plus ordered characteristics.
///
/// Characteristic order is the registration order, and therefore the order of
/// the handles the stack hands back.
pub struct Service<'a> {
    uuid: BleUuid,
    characteristics: Vec<Characteristic<'a>, MAX_CHARACTERISTICS_PER_SERVICE>,
}

impl<'a> Service<'a> {
    pub fn new(uuid: BleUuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn add_characteristic(&mut self, characteristic: Characteristic<'a>) -> Result<()> {
        self.characteristics
            .push(characteristic)
            .map_err(|_| Error::CharacteristicsFull)
    }

    /// Builder-style [`add_characteristic`](Self::add_characteristic).
    pub fn with_characteristic(mut self, characteristic: Characteristic<'a>) -> Result<Self> {
        self.add_characteristic(characteristic)?;
        Ok(self)
    }

    pub fn uuid(&self) -> BleUuid {
        self.uuid
    }

    pub fn characteristics(&self) -> &[Characteristic<'a>] {
        &self.characteristics
    }

    pub(crate) fn characteristics_mut(&mut self) -> &mut [Characteristic<'a>] {
        &mut self.characteristics
    }

    pub fn characteristic(&self, uuid: BleUuid) -> Option<&Characteristic<'a>> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    pub(crate) fn characteristic_mut(&mut self, uuid: BleUuid) -> Option<&mut Characteristic<'a>> {
        self.characteristics.iter_mut().find(|c| c.uuid == uuid)
    }
}

impl core::fmt::Debug for Service<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Service")
            .field("uuid", &self.uuid)
            .field("characteristics", &self.characteristics.as_slice())
            .finish()
    }
}
