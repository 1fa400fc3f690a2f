//! Common test utilities for the host integration tests
//!
//! - `MockRadio`: a recording [`Radio`] with scriptable failures
//! - `Recorder`: a channel handler that remembers what it received
//! - helpers for building connection callbacks

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use ble_ranger::ble::connection::ConnHandle;
use ble_ranger::ble::radio::{Radio, ServiceHandles};
use ble_ranger::ble::registry::{AttrHandle, BleUuid};
use ble_ranger::ble::services::CharacteristicDef;
use ble_ranger::error::{HandlerError, RadioError};
use ble_ranger::protocol::ChannelId;
use ble_ranger::ChannelHandler;

/// One call made against the mock radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Activate(bool),
    AdvertiseStart {
        interval: u16,
        adv_data: Vec<u8>,
        scan_data: Vec<u8>,
    },
    AdvertiseStop,
    RegisterService {
        uuid: BleUuid,
        characteristics: Vec<CharacteristicDef>,
    },
    Notify {
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        value: Vec<u8>,
    },
    ReadValue(AttrHandle),
    SetTxPower(i8),
}

/// Recording radio. Handles are handed out sequentially starting at
/// `0x0010`, skipping one slot after every characteristic (declaration
/// attribute) the way a real attribute table would.
pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub values: HashMap<AttrHandle, Vec<u8>>,
    next_handle: AttrHandle,

    pub fail_activate: bool,
    pub fail_tx_power: bool,
    pub fail_register: bool,
    pub fail_read: bool,
    /// Connections whose notifications fail.
    pub fail_notify_for: Vec<ConnHandle>,
    /// Return this many fewer handles than characteristics registered.
    pub short_handles: usize,
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            values: HashMap::new(),
            next_handle: 0x0010,
            fail_activate: false,
            fail_tx_power: false,
            fail_register: false,
            fail_read: false,
            fail_notify_for: Vec::new(),
            short_handles: 0,
        }
    }

    /// Simulate a central writing `value` to `attr_handle`.
    pub fn write(&mut self, attr_handle: AttrHandle, value: &[u8]) {
        self.values.insert(attr_handle, value.to_vec());
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn advertise_starts(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::AdvertiseStart { .. }))
    }

    pub fn advertise_stops(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::AdvertiseStop))
    }

    pub fn notifies(&self) -> Vec<(ConnHandle, AttrHandle, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::Notify {
                    conn_handle,
                    attr_handle,
                    value,
                } => Some((*conn_handle, *attr_handle, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Most recent advertising + scan response payloads.
    pub fn last_advertisement(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.calls.iter().rev().find_map(|c| match c {
            RadioCall::AdvertiseStart {
                adv_data, scan_data, ..
            } => Some((adv_data.clone(), scan_data.clone())),
            _ => None,
        })
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for MockRadio {
    fn activate(&mut self, active: bool) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Activate(active));
        if self.fail_activate {
            return Err(RadioError::InvalidState);
        }
        Ok(())
    }

    fn advertise_start(&mut self, interval: u16, adv_data: &[u8], scan_data: &[u8]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::AdvertiseStart {
            interval,
            adv_data: adv_data.to_vec(),
            scan_data: scan_data.to_vec(),
        });
        Ok(())
    }

    fn advertise_stop(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::AdvertiseStop);
        Ok(())
    }

    fn register_service(
        &mut self,
        uuid: BleUuid,
        characteristics: &[CharacteristicDef],
    ) -> Result<ServiceHandles, RadioError> {
        self.calls.push(RadioCall::RegisterService {
            uuid,
            characteristics: characteristics.to_vec(),
        });
        if self.fail_register {
            return Err(RadioError::NoResources);
        }

        let mut handles = ServiceHandles::new();
        let count = characteristics.len().saturating_sub(self.short_handles);
        for _ in 0..count {
            // Declaration attribute sits before each value handle
            self.next_handle += 2;
            handles.push(self.next_handle).unwrap();
        }
        Ok(handles)
    }

    fn notify(&mut self, conn_handle: ConnHandle, attr_handle: AttrHandle, value: &[u8]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Notify {
            conn_handle,
            attr_handle,
            value: value.to_vec(),
        });
        if self.fail_notify_for.contains(&conn_handle) {
            return Err(RadioError::Raw(0x3002));
        }
        Ok(())
    }

    fn read_value(&mut self, attr_handle: AttrHandle, buf: &mut [u8]) -> Result<usize, RadioError> {
        self.calls.push(RadioCall::ReadValue(attr_handle));
        if self.fail_read {
            return Err(RadioError::InvalidParam);
        }
        let value = self.values.get(&attr_handle).map(Vec::as_slice).unwrap_or(&[]);
        if value.len() > buf.len() {
            return Err(RadioError::ValueTooLarge(value.len()));
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.calls.push(RadioCall::SetTxPower(dbm));
        if self.fail_tx_power {
            return Err(RadioError::InvalidParam);
        }
        Ok(())
    }
}

/// Channel handler that records every `(channel, data)` it receives.
#[derive(Default)]
pub struct Recorder {
    seen: RefCell<Vec<(ChannelId, String)>>,
    /// Fail when this payload arrives.
    pub fail_on: Option<&'static str>,
}

impl Recorder {
    pub fn failing_on(data: &'static str) -> Self {
        Self {
            seen: RefCell::new(Vec::new()),
            fail_on: Some(data),
        }
    }

    pub fn seen(&self) -> Vec<(ChannelId, String)> {
        self.seen.borrow().clone()
    }
}

impl ChannelHandler for Recorder {
    fn on_data(&self, channel: ChannelId, data: &str) -> Result<(), HandlerError> {
        if self.fail_on == Some(data) {
            return Err(HandlerError::Failed);
        }
        self.seen.borrow_mut().push((channel, data.to_string()));
        Ok(())
    }
}

/// Owned `(channel, data)` pairs for comparing against `Recorder::seen`.
pub fn pairs(items: &[(ChannelId, &str)]) -> Vec<(ChannelId, String)> {
    items.iter().map(|(c, d)| (*c, d.to_string())).collect()
}

/// Records connection handles passed to a connect/disconnect callback.
#[derive(Default)]
pub struct HandleLog {
    handles: RefCell<Vec<ConnHandle>>,
}

impl HandleLog {
    pub fn record(&self, handle: ConnHandle) {
        self.handles.borrow_mut().push(handle);
    }

    pub fn handles(&self) -> Vec<ConnHandle> {
        self.handles.borrow().clone()
    }
}
