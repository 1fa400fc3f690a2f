#![no_std]
#![no_main]

use core::cell::RefCell;

use ble_ranger::ble::advertising::{AdvPayload, ScanResponse};
use ble_ranger::ble::events::{create_connected_event, create_disconnected_event, create_gatts_write_event};
use ble_ranger::ble::notifications::NotificationQueue;
use ble_ranger::ble::radio::{Radio, ServiceHandles};
use ble_ranger::ble::registry::{char_properties, AttrHandle, BleUuid};
use ble_ranger::ble::services::{CharacteristicDef, Value};
use ble_ranger::config::{LEGACY_ADV_DATA_LEN, MAX_CHARACTERISTICS, MAX_CONNECTIONS, MAX_VALUE_LEN};
use ble_ranger::error::{HandlerError, RadioError};
use ble_ranger::protocol::ChannelId;
use ble_ranger::ranger::{self, BleRanger};
use ble_ranger::{BleEvent, ChannelHandler, ChannelRouter, RangerConfig};
use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::{config::Config, interrupt};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heapless::index_map::FnvIndexMap;
use heapless::Vec;
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, WriteOp};
use nrf_softdevice::ble::peripheral::{self, ConnectableAdvertisement};
use nrf_softdevice::ble::{Connection, TxPower, Uuid};
use nrf_softdevice::{Config as SdConfig, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

/// Values written by centrals, by attribute handle. Filled by the GATT server
/// callback, read back by the manager through `Radio::read_value`.
static WRITTEN_VALUES: Mutex<CriticalSectionRawMutex, RefCell<FnvIndexMap<AttrHandle, Value, MAX_CHARACTERISTICS>>> =
    Mutex::new(RefCell::new(FnvIndexMap::new()));

/// Raised whenever the manager starts or stops advertising.
static ADV_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Notifications queued by channel handlers, sent by the BLE task.
static NOTIFICATIONS: NotificationQueue<CriticalSectionRawMutex> = NotificationQueue::new();

static ROUTER: StaticCell<ChannelRouter<'static>> = StaticCell::new();

static ON_CONNECT: fn(u16) = on_connect;
static ON_DISCONNECT: fn(u16) = on_disconnect;

type Ranger = BleRanger<'static, SoftdeviceRadio>;

#[derive(Clone)]
struct AdvRequest {
    interval: u16,
    adv_data: AdvPayload,
    scan_data: ScanResponse,
}

/// [`Radio`] on top of the S140 SoftDevice.
///
/// Services are registered while the adapter still holds the SoftDevice
/// mutably (before `Softdevice::run` is spawned). Advertising is a request
/// picked up by the BLE task; connections are attached by that task.
struct SoftdeviceRadio {
    sd: Option<&'static mut Softdevice>,
    active: bool,
    advertising: Option<AdvRequest>,
    connections: Vec<Connection, MAX_CONNECTIONS>,
    tx_power: TxPower,
}

impl SoftdeviceRadio {
    fn new(sd: &'static mut Softdevice) -> Self {
        Self {
            sd: Some(sd),
            active: false,
            advertising: None,
            connections: Vec::new(),
            tx_power: TxPower::ZerodBm,
        }
    }

    /// Give up registration access so the SoftDevice can be run.
    fn release(&mut self) -> Option<&'static Softdevice> {
        self.sd.take().map(|sd| &*sd)
    }

    fn advertising(&self) -> Option<&AdvRequest> {
        self.advertising.as_ref()
    }

    fn attach(&mut self, conn: Connection) {
        // The SoftDevice stops advertising when a central connects
        self.advertising = None;
        if self.connections.push(conn).is_err() {
            warn!("SD: connection table full");
        }
    }

    fn detach(&mut self, conn_handle: u16) {
        self.connections.retain(|c| c.handle() != Some(conn_handle));
    }
}

fn to_sd_uuid(uuid: BleUuid) -> Uuid {
    match uuid {
        BleUuid::Uuid16(v) => Uuid::new_16(v),
        BleUuid::Uuid128(bytes) => Uuid::new_128(&bytes),
    }
}

fn to_sd_properties(properties: u8) -> Properties {
    let mut props = Properties::new();
    if properties & char_properties::READ != 0 {
        props = props.read();
    }
    if properties & char_properties::WRITE != 0 {
        props = props.write();
    }
    if properties & char_properties::WRITE_WITHOUT_RESPONSE != 0 {
        props = props.write_without_response();
    }
    if properties & char_properties::NOTIFY != 0 {
        props = props.notify();
    }
    if properties & char_properties::INDICATE != 0 {
        props = props.indicate();
    }
    if properties & char_properties::BROADCAST != 0 {
        props = props.broadcast();
    }
    props
}

fn to_tx_power(dbm: i8) -> Option<TxPower> {
    let power = match dbm {
        -40 => TxPower::Minus40dBm,
        -20 => TxPower::Minus20dBm,
        -16 => TxPower::Minus16dBm,
        -12 => TxPower::Minus12dBm,
        -8 => TxPower::Minus8dBm,
        -4 => TxPower::Minus4dBm,
        0 => TxPower::ZerodBm,
        3 => TxPower::Plus3dBm,
        4 => TxPower::Plus4dBm,
        _ => return None,
    };
    Some(power)
}

impl Radio for SoftdeviceRadio {
    fn activate(&mut self, active: bool) -> Result<(), RadioError> {
        self.active = active;
        if !active {
            self.advertising = None;
            for conn in self.connections.iter() {
                let _ = conn.disconnect();
            }
            self.connections.clear();
            ADV_CHANGED.signal(());
        }
        Ok(())
    }

    fn advertise_start(&mut self, interval: u16, adv_data: &[u8], scan_data: &[u8]) -> Result<(), RadioError> {
        if !self.active {
            return Err(RadioError::InvalidState);
        }
        if adv_data.len() > LEGACY_ADV_DATA_LEN || scan_data.len() > LEGACY_ADV_DATA_LEN {
            return Err(RadioError::InvalidParam);
        }

        self.advertising = Some(AdvRequest {
            interval,
            adv_data: Vec::from_slice(adv_data).map_err(|_| RadioError::InvalidParam)?,
            scan_data: Vec::from_slice(scan_data).map_err(|_| RadioError::InvalidParam)?,
        });
        ADV_CHANGED.signal(());
        Ok(())
    }

    fn advertise_stop(&mut self) -> Result<(), RadioError> {
        self.advertising = None;
        ADV_CHANGED.signal(());
        Ok(())
    }

    fn register_service(
        &mut self,
        uuid: BleUuid,
        characteristics: &[CharacteristicDef],
    ) -> Result<ServiceHandles, RadioError> {
        let sd = self.sd.as_deref_mut().ok_or(RadioError::InvalidState)?;
        let mut sb = ServiceBuilder::new(sd, to_sd_uuid(uuid)).map_err(|e| {
            error!("SD: service registration failed: {:?}", Debug2Format(&e));
            RadioError::NoResources
        })?;

        let empty: &[u8] = &[];
        let mut handles = ServiceHandles::new();
        for def in characteristics {
            let attr = Attribute::new(empty).variable_len(MAX_VALUE_LEN as u16);
            let metadata = Metadata::new(to_sd_properties(def.properties));
            let characteristic = sb
                .add_characteristic(to_sd_uuid(def.uuid), attr, metadata)
                .map_err(|e| {
                    error!("SD: characteristic registration failed: {:?}", Debug2Format(&e));
                    RadioError::NoResources
                })?
                .build();
            handles
                .push(characteristic.value_handle)
                .map_err(|_| RadioError::NoResources)?;
        }
        let _ = sb.build();

        Ok(handles)
    }

    fn notify(&mut self, conn_handle: u16, attr_handle: AttrHandle, value: &[u8]) -> Result<(), RadioError> {
        let conn = self
            .connections
            .iter()
            .find(|c| c.handle() == Some(conn_handle))
            .ok_or(RadioError::InvalidState)?;

        gatt_server::notify_value(conn, attr_handle, value).map_err(|e| {
            debug!("SD: notify failed: {:?}", Debug2Format(&e));
            RadioError::InvalidState
        })
    }

    fn read_value(&mut self, attr_handle: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError> {
        WRITTEN_VALUES.lock(|cell| {
            let values = cell.borrow();
            let value = values.get(&attr_handle).ok_or(RadioError::InvalidParam)?;
            if value.len() > buf.len() {
                return Err(RadioError::ValueTooLarge(value.len()));
            }
            buf[..value.len()].copy_from_slice(value);
            Ok(value.len())
        })
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.tx_power = to_tx_power(dbm).ok_or(RadioError::InvalidParam)?;
        Ok(())
    }
}

/// GATT server callback: caches written values and reports the write.
struct GattServer;

static GATT_SERVER: GattServer = GattServer;

impl gatt_server::Server for GattServer {
    type Event = BleEvent;

    fn on_write(&self, conn: &Connection, handle: u16, _op: WriteOp, offset: usize, data: &[u8]) -> Option<BleEvent> {
        if offset != 0 {
            warn!("SD: ignoring offset write ({}) to handle {}", offset, handle);
            return None;
        }
        let conn_handle = conn.handle()?;
        if data.len() > MAX_VALUE_LEN {
            warn!("SD: dropping {} byte write to handle {}", data.len(), handle);
            return None;
        }

        let stored = WRITTEN_VALUES.lock(|cell| {
            let value = Value::from_slice(data).ok()?;
            cell.borrow_mut().insert(handle, value).ok()
        });
        if stored.is_none() {
            warn!("SD: value cache full, dropping write to handle {}", handle);
            return None;
        }

        Some(create_gatts_write_event(conn_handle, handle))
    }
}

/// Channel 1: log the data and echo it back on TX.
struct Echo;

static ECHO: Echo = Echo;

impl ChannelHandler for Echo {
    fn on_data(&self, channel: ChannelId, data: &str) -> Result<(), HandlerError> {
        info!("data received:: channel: {} data: {}", channel, data);
        NOTIFICATIONS
            .enqueue(ranger::TX_UUID, data.as_bytes())
            .map_err(|_| HandlerError::Failed)
    }
}

fn on_connect(conn_handle: u16) {
    info!("connected ({})", conn_handle);
}

fn on_disconnect(conn_handle: u16) {
    info!("disconnected ({})", conn_handle);
}

fn with_ranger<T>(ranger: &Mutex<CriticalSectionRawMutex, RefCell<Ranger>>, f: impl FnOnce(&mut Ranger) -> T) -> T {
    ranger.lock(|cell| f(&mut cell.borrow_mut()))
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting nRF52820 S140 ranger firmware");

    // Keep interrupt priorities off the SoftDevice reserved levels (0, 1, 4)
    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    let sd_config = SdConfig {
        clock: Some(nrf_softdevice::raw::nrf_clock_lf_cfg_t {
            source: nrf_softdevice::raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: nrf_softdevice::raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(nrf_softdevice::raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(nrf_softdevice::raw::ble_gatt_conn_cfg_t { att_mtu: 247 }),
        gatts_attr_tab_size: Some(nrf_softdevice::raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: 1408,
        }),
        gap_role_count: Some(nrf_softdevice::raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: Default::default(),
        }),
        ..Default::default()
    };
    let sd = Softdevice::enable(&sd_config);
    info!("SoftDevice enabled");

    let router: &'static ChannelRouter<'static> = ROUTER.init(ChannelRouter::new());
    unwrap!(router.register_channel(1, &ECHO));

    let mut ranger = match BleRanger::new(SoftdeviceRadio::new(sd), RangerConfig::default(), router) {
        Ok(ranger) => ranger,
        Err(e) => defmt::panic!("ranger setup failed: {:?}", e),
    };
    ranger.register_connect(&ON_CONNECT);
    ranger.register_disconnect(&ON_DISCONNECT);

    let sd = unwrap!(ranger.manager_mut().radio_mut().release());
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(ble_task(sd, ranger)));

    loop {
        Timer::after(Duration::from_secs(10)).await;
        info!("Heartbeat - system running");
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// Drives advertising and connections, feeding every event to the ranger.
#[embassy_executor::task]
async fn ble_task(sd: &'static Softdevice, ranger: Ranger) {
    let ranger = Mutex::<CriticalSectionRawMutex, _>::new(RefCell::new(ranger));

    loop {
        let request = with_ranger(&ranger, |r| r.manager().radio().advertising().cloned());
        let request = match request {
            Some(request) => request,
            None => {
                ADV_CHANGED.wait().await;
                continue;
            }
        };
        ADV_CHANGED.reset();

        let tx_power = with_ranger(&ranger, |r| r.manager().radio().tx_power);
        let config = peripheral::Config {
            interval: request.interval as u32,
            tx_power,
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: &request.adv_data,
            scan_data: &request.scan_data,
        };

        let conn = match select(peripheral::advertise_connectable(sd, adv, &config), ADV_CHANGED.wait()).await {
            Either::First(Ok(conn)) => conn,
            Either::First(Err(e)) => {
                error!("BLE advertising failed: {:?}", Debug2Format(&e));
                Timer::after(Duration::from_secs(1)).await;
                continue;
            }
            // Advertising parameters changed or advertising was stopped
            Either::Second(()) => continue,
        };
        let conn_handle = match conn.handle() {
            Some(handle) => handle,
            None => continue,
        };

        with_ranger(&ranger, |r| {
            r.manager_mut().radio_mut().attach(conn.clone());
            r.handle_event(create_connected_event(conn_handle));
        });

        let served = select(
            gatt_server::run(&conn, &GATT_SERVER, |event| with_ranger(&ranger, |r| r.handle_event(event))),
            flush_notifications(&ranger),
        )
        .await;
        if let Either::First(e) = served {
            info!("gatt_server run exited: {:?}", Debug2Format(&e));
        }

        with_ranger(&ranger, |r| {
            r.manager_mut().radio_mut().detach(conn_handle);
            r.handle_event(create_disconnected_event(conn_handle, 0));
        });
    }
}

async fn flush_notifications(ranger: &Mutex<CriticalSectionRawMutex, RefCell<Ranger>>) {
    loop {
        Timer::after(Duration::from_millis(20)).await;
        if !NOTIFICATIONS.is_empty() {
            with_ranger(ranger, |r| r.flush(&NOTIFICATIONS));
        }
    }
}
