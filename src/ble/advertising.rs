//! BLE Advertising Controller
//!
//! Builds the advertising and scan response payloads from the device name and
//! the advertised service UUIDs, and tracks whether advertising is running.
//!
//! Payload layout (each AD structure is `[length][type][value]`, `length`
//! counting type + value):
//! - advertising data: Flags `02 01 06`, then one Complete List of Service
//!   UUIDs structure per UUID (`[17] 07 <uuid LE>` for 128-bit,
//!   `[3] 03 <uuid LE>` for 16-bit)
//! - scan response: Complete Local Name `[len+1] 09 <name>`

use heapless::{String, Vec};

use crate::ble::radio::Radio;
use crate::ble::registry::BleUuid;
use crate::config::{LEGACY_ADV_DATA_LEN, MAX_ADV_UUIDS, MAX_DEVICE_NAME_LEN};
use crate::error::{Error, RadioError, Result};

/// AD type codes (Bluetooth Assigned Numbers, "Common Data Types")
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const COMPLETE_16BIT_SERVICE_UUIDS: u8 = 0x03;
    pub const COMPLETE_128BIT_SERVICE_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
}

/// LE General Discoverable Mode | BR/EDR Not Supported
pub const FLAGS_GENERAL_DISC_NO_BREDR: u8 = 0x06;

/// Flags (3 bytes) plus the largest UUID structures we carry.
pub const MAX_ADV_PAYLOAD_LEN: usize = 3 + MAX_ADV_UUIDS * 18;

/// Name plus its 2-byte AD header.
pub const MAX_SCAN_RESPONSE_LEN: usize = MAX_DEVICE_NAME_LEN + 2;

pub type AdvPayload = Vec<u8, MAX_ADV_PAYLOAD_LEN>;
pub type ScanResponse = Vec<u8, MAX_SCAN_RESPONSE_LEN>;

/// Advertising state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvState {
    Stopped,
    Active,
}

/// Advertising controller state
pub struct Advertiser {
    name: String<MAX_DEVICE_NAME_LEN>,
    service_uuids: Vec<BleUuid, MAX_ADV_UUIDS>,
    state: AdvState,
}

impl Advertiser {
    /// Create an advertiser for `name` (at most [`MAX_DEVICE_NAME_LEN`]
    /// UTF-8 bytes).
    pub fn new(name: &str) -> Result<Self> {
        let mut stored = String::new();
        stored.push_str(name).map_err(|_| Error::NameTooLong)?;

        Ok(Self {
            name: stored,
            service_uuids: Vec::new(),
            state: AdvState::Stopped,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a service UUID to the advertising payload. No de-duplication.
    pub fn add_service_uuid(&mut self, uuid: BleUuid) -> Result<()> {
        self.service_uuids
            .push(uuid)
            .map_err(|_| Error::AdvertisingFull)?;
        debug!("ADV: advertising service {:?}", uuid);
        Ok(())
    }

    pub fn service_uuids(&self) -> &[BleUuid] {
        &self.service_uuids
    }

    pub fn state(&self) -> AdvState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.state == AdvState::Active
    }

    /// Build the advertising payload.
    pub fn adv_payload(&self) -> AdvPayload {
        let mut payload = AdvPayload::new();
        // Capacity covers flags + MAX_ADV_UUIDS 128-bit structures, so the
        // pushes below cannot overflow.
        let _ = payload.extend_from_slice(&[2, ad_type::FLAGS, FLAGS_GENERAL_DISC_NO_BREDR]);

        for uuid in &self.service_uuids {
            let mut bytes = [0u8; 16];
            let len = match uuid.write_le_bytes(&mut bytes) {
                Some(len) => len,
                None => continue,
            };
            let kind = match uuid {
                BleUuid::Uuid16(_) => ad_type::COMPLETE_16BIT_SERVICE_UUIDS,
                BleUuid::Uuid128(_) => ad_type::COMPLETE_128BIT_SERVICE_UUIDS,
            };
            let _ = payload.push(len as u8 + 1);
            let _ = payload.push(kind);
            let _ = payload.extend_from_slice(&bytes[..len]);
        }

        payload
    }

    /// Build the scan response payload (complete local name).
    pub fn scan_response(&self) -> ScanResponse {
        let name = self.name.as_bytes();
        let mut payload = ScanResponse::new();
        let _ = payload.push(name.len() as u8 + 1);
        let _ = payload.push(ad_type::COMPLETE_LOCAL_NAME);
        let _ = payload.extend_from_slice(name);
        payload
    }

    /// Submit both payloads to the radio and (re)start advertising.
    pub fn start<R: Radio>(&mut self, radio: &mut R, interval: u16) -> Result<(), RadioError> {
        let adv = self.adv_payload();
        let scan = self.scan_response();

        if adv.len() > LEGACY_ADV_DATA_LEN {
            warn!(
                "ADV: payload is {} bytes, legacy advertising allows {}",
                adv.len(),
                LEGACY_ADV_DATA_LEN
            );
        }

        radio.advertise_start(interval, &adv, &scan)?;
        self.state = AdvState::Active;
        info!(
            "ADV: advertising '{}' with {} service UUIDs",
            self.name.as_str(),
            self.service_uuids.len()
        );
        Ok(())
    }

    /// Stop advertising. No radio call when already stopped.
    pub fn stop<R: Radio>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        if self.state == AdvState::Stopped {
            return Ok(());
        }

        radio.advertise_stop()?;
        self.state = AdvState::Stopped;
        info!("ADV: advertising stopped");
        Ok(())
    }

    /// The stack stopped advertising on its own (a central connected).
    pub(crate) fn mark_stopped(&mut self) {
        self.state = AdvState::Stopped;
    }
}

/// Iterator over the AD structures of an advertising buffer.
///
/// Yields `(ad_type, value)`; stops at a zero length byte or at a structure
/// that would run past the end of the buffer.
pub struct AdStructures<'d> {
    data: &'d [u8],
}

impl<'d> Iterator for AdStructures<'d> {
    type Item = (u8, &'d [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.data.split_first()?;
        let len = len as usize;
        if len == 0 || len > rest.len() {
            self.data = &[];
            return None;
        }
        let (structure, remaining) = rest.split_at(len);
        self.data = remaining;
        Some((structure[0], &structure[1..]))
    }
}

pub fn parse_ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data }
}
