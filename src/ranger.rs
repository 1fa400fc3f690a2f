//! BLE Ranger
//!
//! Ready-made peripheral: one service with an RX characteristic (centrals
//! write channel commands, routed by a [`ChannelRouter`]) and a TX
//! characteristic (raw bytes notified back to centrals). The service UUID is
//! advertised so scanners can filter on it.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::ble::connection::ConnHandle;
use crate::ble::events::BleEvent;
use crate::ble::manager::{ConnectionCallback, PeripheralManager};
use crate::ble::notifications::NotificationQueue;
use crate::ble::radio::Radio;
use crate::ble::registry::{char_properties, BleUuid};
use crate::ble::services::{Characteristic, Service};
use crate::config::RangerConfig;
use crate::error::Result;
use crate::router::ChannelRouter;

/// Ranger service.
pub const SERVICE_UUID: BleUuid = BleUuid::from_u128(0x0bfc2787_e220_4b0f_ae98_13731add0000);
/// Device -> central data (notify).
pub const TX_UUID: BleUuid = BleUuid::from_u128(0x0bfc2787_e220_4b0f_ae98_13731add0001);
/// Central -> device channel commands (write).
pub const RX_UUID: BleUuid = BleUuid::from_u128(0x0bfc2787_e220_4b0f_ae98_13731add0002);

pub struct BleRanger<'a, R: Radio> {
    manager: PeripheralManager<'a, R>,
}

impl<'a, R: Radio> BleRanger<'a, R> {
    /// Register the ranger service, wire RX to `router` and start
    /// advertising.
    pub fn new<'h, M>(radio: R, config: RangerConfig, router: &'a ChannelRouter<'h, M>) -> Result<Self>
    where
        'h: 'a,
        M: RawMutex + 'a,
    {
        let mut manager = PeripheralManager::new(radio, config.into())?;

        let rx = Characteristic::new(RX_UUID, char_properties::WRITE)?.with_write_handler(router);
        let tx = Characteristic::new(TX_UUID, char_properties::NOTIFY)?;
        let service = Service::new(SERVICE_UUID)
            .with_characteristic(rx)?
            .with_characteristic(tx)?;

        manager.add_service(service)?;
        manager.set_advertising_service(SERVICE_UUID)?;
        manager.start_advertising()?;

        info!("RANGER: '{}' up", config.name);
        Ok(Self { manager })
    }

    pub fn register_connect(&mut self, callback: ConnectionCallback<'a>) {
        self.manager.register_connect_callback(callback);
    }

    pub fn register_disconnect(&mut self, callback: ConnectionCallback<'a>) {
        self.manager.register_disconnect_callback(callback);
    }

    /// Notify `value` on TX to every connected central.
    pub fn send(&mut self, value: &[u8]) -> Result<usize> {
        self.manager.notify(TX_UUID, value)
    }

    pub fn handle_event(&mut self, event: BleEvent) {
        self.manager.handle_event(event);
    }

    /// Send what channel handlers queued.
    pub fn flush<M: RawMutex>(&mut self, queue: &NotificationQueue<M>) -> usize {
        self.manager.flush(queue)
    }

    pub fn is_connected(&self, conn_handle: ConnHandle) -> bool {
        self.manager.is_connected(conn_handle)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.manager.shutdown()
    }

    pub fn manager(&self) -> &PeripheralManager<'a, R> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PeripheralManager<'a, R> {
        &mut self.manager
    }
}
