//! Peripheral Manager
//!
//! Owns the radio, the advertiser, the registered GATT model, the handle
//! registry and the connection set, and turns radio events into connection
//! bookkeeping and write-handler calls.
//!
//! Per connection handle the lifecycle is `absent -> connected -> absent`:
//! a connect event inserts, a disconnect event removes and restarts
//! advertising. Writes are resolved through the handle registry.
//!
//! The event dispatcher never fails outward: radio errors, unknown handles and
//! handler errors are logged and dropped so one bad write cannot take the
//! event path down.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::ble::advertising::Advertiser;
use crate::ble::connection::{ConnHandle, ConnectionManager};
use crate::ble::events::BleEvent;
use crate::ble::notifications::NotificationQueue;
use crate::ble::radio::Radio;
use crate::ble::registry::{AttrHandle, BleUuid, CharRef, HandleRegistry};
use crate::ble::services::{Characteristic, CharacteristicDef, Service};
use crate::config::{PeripheralConfig, MAX_CHARACTERISTICS_PER_SERVICE, MAX_SERVICES, MAX_VALUE_LEN};
use crate::error::{Error, RadioError, Result};

/// Connection lifecycle callback: receives the connection handle.
pub type ConnectionCallback<'a> = &'a dyn Fn(ConnHandle);

pub struct PeripheralManager<'a, R: Radio> {
    radio: R,
    config: PeripheralConfig,
    advertiser: Advertiser,
    services: Vec<Service<'a>, MAX_SERVICES>,
    handles: HandleRegistry,
    connections: ConnectionManager,
    on_connect: Option<ConnectionCallback<'a>>,
    on_disconnect: Option<ConnectionCallback<'a>>,
    active: bool,
}

impl<'a, R: Radio> PeripheralManager<'a, R> {
    /// Bring the radio up and prepare advertising for `config.name`.
    ///
    /// A radio that cannot be activated is fatal; a rejected TX power is not.
    pub fn new(mut radio: R, config: PeripheralConfig) -> Result<Self> {
        let advertiser = Advertiser::new(config.name)?;

        radio.activate(true).map_err(|e| {
            error!("GATT: failed to activate radio: {:?}", e);
            Error::Radio(e)
        })?;

        let mut manager = Self {
            radio,
            config,
            advertiser,
            services: Vec::new(),
            handles: HandleRegistry::new(),
            connections: ConnectionManager::new(),
            on_connect: None,
            on_disconnect: None,
            active: true,
        };
        manager.set_tx_power(config.tx_power);

        info!("GATT: peripheral '{}' ready", config.name);
        Ok(manager)
    }

    /// Register a service and all of its characteristics with the stack.
    ///
    /// Handles come back in characteristic order and are zipped positionally.
    pub fn add_service(&mut self, mut service: Service<'a>) -> Result<()> {
        if self.services.is_full() {
            return Err(Error::ServicesFull);
        }
        let count = service.characteristics().len();
        if !self.handles.has_room_for(count) {
            return Err(Error::HandleRegistryFull);
        }

        let mut defs: Vec<CharacteristicDef, MAX_CHARACTERISTICS_PER_SERVICE> = Vec::new();
        for characteristic in service.characteristics() {
            // Same capacity as the service's characteristic list
            let _ = defs.push(characteristic.def());
        }

        let handles = self
            .radio
            .register_service(service.uuid(), &defs)
            .map_err(|e| {
                error!("GATT: registration of {:?} failed: {:?}", service.uuid(), e);
                Error::Radio(e)
            })?;

        if handles.len() != count {
            warn!(
                "GATT: {:?} registered {} characteristics but got {} handles",
                service.uuid(),
                count,
                handles.len()
            );
        }

        let index = self.services.len() as u8;
        for (position, (characteristic, &handle)) in service
            .characteristics_mut()
            .iter_mut()
            .zip(handles.iter())
            .enumerate()
        {
            characteristic.assign_handle(handle);
            self.handles.insert(
                handle,
                CharRef {
                    service: index,
                    characteristic: position as u8,
                },
            )?;
            debug!(
                "GATT: {:?} -> handle {}",
                characteristic.uuid(),
                handle
            );
        }

        info!(
            "GATT: service {:?} registered with {} characteristics",
            service.uuid(),
            count
        );
        self.services.push(service).map_err(|_| Error::ServicesFull)
    }

    /// Advertise `uuid` in the advertising payload from the next start on.
    pub fn set_advertising_service(&mut self, uuid: BleUuid) -> Result<()> {
        self.advertiser.add_service_uuid(uuid)
    }

    /// Start (or restart) advertising at the configured interval.
    pub fn start_advertising(&mut self) -> Result<()> {
        self.start_advertising_with(self.config.adv_interval)
    }

    /// Start (or restart) advertising; `interval` is in 0.625 ms units.
    pub fn start_advertising_with(&mut self, interval: u16) -> Result<()> {
        self.advertiser.start(&mut self.radio, interval)?;
        Ok(())
    }

    pub fn stop_advertising(&mut self) -> Result<()> {
        self.advertiser.stop(&mut self.radio)?;
        Ok(())
    }

    /// Update the characteristic identified by `uuid` and notify every
    /// connected central.
    ///
    /// Returns the number of centrals the notification was sent to. A failed
    /// send to one central is logged and does not stop the others. Lookup and
    /// size are checked before anything changes.
    pub fn notify(&mut self, uuid: BleUuid, value: &[u8]) -> Result<usize> {
        let characteristic = match self
            .services
            .iter_mut()
            .find_map(|service| service.characteristic_mut(uuid))
        {
            Some(c) => c,
            None => {
                warn!("GATT: notify on unknown characteristic {:?}", uuid);
                return Err(Error::NotFound);
            }
        };

        let handle = match characteristic.handle() {
            Some(handle) => handle,
            None => {
                warn!("GATT: {:?} has no attribute handle", uuid);
                return Err(Error::NotFound);
            }
        };
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::ValueTooLarge);
        }
        characteristic.set_value(value)?;

        let mut sent = 0;
        for conn_handle in self.connections.active_handles() {
            match self.radio.notify(conn_handle, handle, value) {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    "GATT: notify {:?} to connection {} failed: {:?}",
                    uuid, conn_handle, e
                ),
            }
        }

        trace!("GATT: notified {} centrals ({} bytes)", sent, value.len());
        Ok(sent)
    }

    /// Apply a transmit power. Returns whether the stack accepted it.
    pub fn set_tx_power(&mut self, dbm: i8) -> bool {
        match self.radio.set_tx_power(dbm) {
            Ok(()) => {
                debug!("GATT: tx power {} dBm", dbm);
                true
            }
            Err(e) => {
                warn!("GATT: could not set tx power {} dBm: {:?}", dbm, e);
                false
            }
        }
    }

    /// Replace the connect callback.
    pub fn register_connect_callback(&mut self, callback: ConnectionCallback<'a>) {
        self.on_connect = Some(callback);
    }

    /// Replace the disconnect callback.
    pub fn register_disconnect_callback(&mut self, callback: ConnectionCallback<'a>) {
        self.on_disconnect = Some(callback);
    }

    /// Dispatch one radio event. Events arriving after [`shutdown`] are
    /// dropped.
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn handle_event(&mut self, event: BleEvent) {
        if !self.active {
            debug!("GATT: ignoring {:?} after shutdown", event);
            return;
        }
        trace!("GATT: event {:?}", event);
        match event {
            BleEvent::Connected { conn_handle } => self.on_central_connected(conn_handle),
            BleEvent::Disconnected { conn_handle, reason } => {
                self.on_central_disconnected(conn_handle, reason)
            }
            BleEvent::GattsWrite {
                conn_handle,
                attr_handle,
            } => self.on_gatts_write(conn_handle, attr_handle),
        }
    }

    fn on_central_connected(&mut self, conn_handle: ConnHandle) {
        // The stack stops advertising once a central connects
        self.advertiser.mark_stopped();

        if let Err(e) = self.connections.add_connection(conn_handle) {
            error!("CONN: dropping connection {}: {:?}", conn_handle, e);
            return;
        }
        info!("CONN: central {} connected", conn_handle);

        if let Some(callback) = self.on_connect {
            callback(conn_handle);
        }
    }

    fn on_central_disconnected(&mut self, conn_handle: ConnHandle, reason: u8) {
        // Unknown handles are logged by the connection set; the callback and
        // the advertising restart still happen.
        let _ = self.connections.remove_connection(conn_handle);
        info!("CONN: central {} disconnected (reason 0x{:x})", conn_handle, reason);

        if let Some(callback) = self.on_disconnect {
            callback(conn_handle);
        }

        if let Err(e) = self.advertiser.start(&mut self.radio, self.config.adv_interval) {
            error!("ADV: failed to restart advertising: {:?}", e);
        }
    }

    fn on_gatts_write(&mut self, conn_handle: ConnHandle, attr_handle: AttrHandle) {
        let mut buf = [0u8; MAX_VALUE_LEN];
        let len = match self.radio.read_value(attr_handle, &mut buf) {
            Ok(len) if len <= MAX_VALUE_LEN => len,
            Ok(len) | Err(RadioError::ValueTooLarge(len)) => {
                warn!(
                    "GATT: dropping {} byte write to handle {} (limit {})",
                    len, attr_handle, MAX_VALUE_LEN
                );
                return;
            }
            Err(e) => {
                error!("GATT: failed to read handle {}: {:?}", attr_handle, e);
                return;
            }
        };
        let value = &buf[..len];

        let characteristic = match self.characteristic_by_handle(attr_handle) {
            Some(c) => c,
            None => {
                warn!("GATT: write to unknown handle {}", attr_handle);
                return;
            }
        };

        match characteristic.write_handler() {
            Some(handler) => {
                if let Err(e) = handler.on_write(conn_handle, characteristic, value) {
                    warn!(
                        "GATT: write handler for {:?} failed: {:?}",
                        characteristic.uuid(),
                        e
                    );
                }
            }
            None => debug!(
                "GATT: {} byte write to {:?} has no handler",
                len,
                characteristic.uuid()
            ),
        }
    }

    /// Send every notification waiting in `queue`. Returns how many queued
    /// notifications were sent to at least one central.
    pub fn flush<M: RawMutex>(&mut self, queue: &NotificationQueue<M>) -> usize {
        let mut delivered = 0;
        while let Some(pending) = queue.try_next() {
            match self.notify(pending.uuid, &pending.data) {
                Ok(0) => {}
                Ok(_) => delivered += 1,
                Err(e) => warn!("GATT: dropped queued notification for {:?}: {:?}", pending.uuid, e),
            }
        }
        delivered
    }

    /// Forget all connections, stop advertising and power the radio down.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.active {
            debug!("GATT: already shut down");
            self.connections.clear();
            return Ok(());
        }
        self.active = false;
        self.connections.clear();

        let stopped = self.advertiser.stop(&mut self.radio);
        if let Err(e) = stopped {
            error!("ADV: failed to stop advertising: {:?}", e);
        }
        let deactivated = self.radio.activate(false);
        if let Err(e) = deactivated {
            error!("GATT: failed to deactivate radio: {:?}", e);
        }

        info!("GATT: peripheral shut down");
        stopped.and(deactivated).map_err(Error::from)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn is_connected(&self, conn_handle: ConnHandle) -> bool {
        self.connections.is_connected(conn_handle)
    }

    pub fn advertiser(&self) -> &Advertiser {
        &self.advertiser
    }

    pub fn services(&self) -> &[Service<'a>] {
        &self.services
    }

    /// First characteristic with `uuid` across all registered services.
    pub fn characteristic(&self, uuid: BleUuid) -> Option<&Characteristic<'a>> {
        self.services
            .iter()
            .find_map(|service| service.characteristic(uuid))
    }

    pub fn characteristic_by_handle(&self, handle: AttrHandle) -> Option<&Characteristic<'a>> {
        let char_ref = self.handles.resolve(handle)?;
        self.services
            .get(char_ref.service as usize)?
            .characteristics()
            .get(char_ref.characteristic as usize)
    }
}
