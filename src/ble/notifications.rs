//! Notification Queue
//!
//! Outbound notifications requested from contexts that cannot reach the
//! peripheral manager directly (channel handlers running inside the write
//! dispatch, other tasks). Requests are buffered here and sent when the owner
//! of the manager calls [`PeripheralManager::flush`].
//!
//! [`PeripheralManager::flush`]: crate::ble::manager::PeripheralManager::flush

use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_sync::channel::Channel;

use crate::ble::registry::BleUuid;
use crate::ble::services::Value;
use crate::config::NOTIFICATION_QUEUE_DEPTH;
use crate::error::{Error, Result};

/// Notification request: characteristic UUID plus the bytes to push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotification {
    pub uuid: BleUuid,
    pub data: Value,
}

/// Bounded queue of pending notifications.
///
/// `M` picks the lock: [`NoopRawMutex`] when producer and consumer share one
/// executor, `CriticalSectionRawMutex` when the queue is a `static` touched
/// from interrupt context.
pub struct NotificationQueue<M: RawMutex = NoopRawMutex> {
    channel: Channel<M, OutboundNotification, NOTIFICATION_QUEUE_DEPTH>,
}

impl<M: RawMutex> NotificationQueue<M> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Queue a notification. Never blocks.
    pub fn enqueue(&self, uuid: BleUuid, data: &[u8]) -> Result<()> {
        let data = Value::from_slice(data).map_err(|_| Error::ValueTooLarge)?;

        self.channel
            .try_send(OutboundNotification { uuid, data })
            .map_err(|_| {
                warn!("GATT: notification queue full, dropping update for {:?}", uuid);
                Error::QueueFull
            })
    }

    /// Take the oldest pending notification.
    pub fn try_next(&self) -> Option<OutboundNotification> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<M: RawMutex> Default for NotificationQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}
