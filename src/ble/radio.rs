//! Radio stack interface
//!
//! What the peripheral manager needs from the underlying BLE stack. The
//! firmware implements it on top of the SoftDevice; tests implement it with a
//! recording mock.
//!
//! Events flow the other way: the integration decodes stack activity into
//! [`BleEvent`](crate::ble::events::BleEvent)s and hands them to
//! [`PeripheralManager::handle_event`](crate::ble::manager::PeripheralManager::handle_event).

use heapless::Vec;

use crate::ble::connection::ConnHandle;
use crate::ble::registry::{AttrHandle, BleUuid};
use crate::ble::services::CharacteristicDef;
use crate::config::MAX_CHARACTERISTICS_PER_SERVICE;
use crate::error::RadioError;

/// Handles returned by a service registration, one per characteristic, in
/// submission order.
pub type ServiceHandles = Vec<AttrHandle, MAX_CHARACTERISTICS_PER_SERVICE>;

pub trait Radio {
    /// Power the controller up or down.
    fn activate(&mut self, active: bool) -> Result<(), RadioError>;

    /// Start (or restart) connectable advertising.
    ///
    /// `interval` is in 0.625 ms units.
    fn advertise_start(
        &mut self,
        interval: u16,
        adv_data: &[u8],
        scan_data: &[u8],
    ) -> Result<(), RadioError>;

    /// Stop advertising.
    fn advertise_stop(&mut self) -> Result<(), RadioError>;

    /// Register one service and its characteristics atomically.
    fn register_service(
        &mut self,
        uuid: BleUuid,
        characteristics: &[CharacteristicDef],
    ) -> Result<ServiceHandles, RadioError>;

    /// Send a notification to one central.
    fn notify(
        &mut self,
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), RadioError>;

    /// Copy the current value of an attribute into `buf`, returning its length.
    ///
    /// A value longer than `buf` is never cut short: the call fails with
    /// [`RadioError::ValueTooLarge`] carrying the stored length.
    fn read_value(&mut self, attr_handle: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// Configure transmit power (dBm).
    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError>;
}

impl<T: Radio + ?Sized> Radio for &mut T {
    fn activate(&mut self, active: bool) -> Result<(), RadioError> {
        (**self).activate(active)
    }

    fn advertise_start(
        &mut self,
        interval: u16,
        adv_data: &[u8],
        scan_data: &[u8],
    ) -> Result<(), RadioError> {
        (**self).advertise_start(interval, adv_data, scan_data)
    }

    fn advertise_stop(&mut self) -> Result<(), RadioError> {
        (**self).advertise_stop()
    }

    fn register_service(
        &mut self,
        uuid: BleUuid,
        characteristics: &[CharacteristicDef],
    ) -> Result<ServiceHandles, RadioError> {
        (**self).register_service(uuid, characteristics)
    }

    fn notify(
        &mut self,
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), RadioError> {
        (**self).notify(conn_handle, attr_handle, value)
    }

    fn read_value(&mut self, attr_handle: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError> {
        (**self).read_value(attr_handle, buf)
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        (**self).set_tx_power(dbm)
    }
}
