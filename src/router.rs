//! Channel Router
//!
//! Fans the commands of one written value out to per-channel handlers (see
//! [`protocol`](crate::protocol) for the encoding). The router is the
//! [`WriteHandler`] of a single characteristic.
//!
//! A batch is processed in order and stops at the first problem: a segment
//! that does not decode or a handler that fails. Commands already dispatched
//! stay dispatched. Commands for channels nobody registered are logged and
//! skipped.
//!
//! Handlers are looked up and released before they run, so a handler may
//! register or unregister channels on the same router.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use heapless::index_map::FnvIndexMap;

use crate::ble::connection::ConnHandle;
use crate::ble::services::{Characteristic, WriteHandler};
use crate::config::MAX_CHANNELS;
use crate::error::{DecodeError, Error, HandlerError, Result};
use crate::protocol::{self, ChannelId};

/// Receives the data of every command addressed to its channel.
pub trait ChannelHandler {
    fn on_data(&self, channel: ChannelId, data: &str) -> Result<(), HandlerError>;
}

impl<F> ChannelHandler for F
where
    F: Fn(ChannelId, &str) -> Result<(), HandlerError>,
{
    fn on_data(&self, channel: ChannelId, data: &str) -> Result<(), HandlerError> {
        self(channel, data)
    }
}

/// Outcome of a fully processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouteSummary {
    /// Commands handed to a registered handler.
    pub dispatched: usize,
    /// Commands for channels with no handler.
    pub unhandled: usize,
}

/// Why a batch was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteError {
    /// The value or one of its segments did not decode.
    Decode {
        error: DecodeError,
        dispatched: usize,
    },
    /// A channel handler failed.
    Handler {
        channel: ChannelId,
        error: HandlerError,
        dispatched: usize,
    },
}

impl RouteError {
    /// Commands dispatched before the batch was aborted.
    pub fn dispatched(&self) -> usize {
        match self {
            RouteError::Decode { dispatched, .. } | RouteError::Handler { dispatched, .. } => {
                *dispatched
            }
        }
    }
}

impl From<RouteError> for HandlerError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::Decode { error, .. } => HandlerError::Decode(error),
            RouteError::Handler { error, .. } => error,
        }
    }
}

type ChannelMap<'h> = FnvIndexMap<ChannelId, &'h dyn ChannelHandler, MAX_CHANNELS>;

pub struct ChannelRouter<'h, M: RawMutex = NoopRawMutex> {
    channels: Mutex<M, RefCell<ChannelMap<'h>>>,
}

impl<'h, M: RawMutex> ChannelRouter<'h, M> {
    pub const fn new() -> Self {
        Self {
            channels: Mutex::new(RefCell::new(FnvIndexMap::new())),
        }
    }

    /// Route `channel` to `handler`, replacing any previous handler.
    pub fn register_channel(&self, channel: ChannelId, handler: &'h dyn ChannelHandler) -> Result<()> {
        self.channels.lock(|cell| {
            let mut channels = cell.try_borrow_mut().map_err(|_| Error::Busy)?;
            match channels.insert(channel, handler) {
                Ok(Some(_)) => {
                    debug!("ROUTER: channel {} handler replaced", channel);
                    Ok(())
                }
                Ok(None) => {
                    debug!("ROUTER: channel {} registered", channel);
                    Ok(())
                }
                Err(_) => {
                    error!("ROUTER: no room for channel {}", channel);
                    Err(Error::ChannelsFull)
                }
            }
        })
    }

    /// Stop routing `channel`. Returns whether it was registered.
    pub fn unregister_channel(&self, channel: ChannelId) -> Result<bool> {
        self.channels.lock(|cell| {
            let mut channels = cell.try_borrow_mut().map_err(|_| Error::Busy)?;
            Ok(channels.remove(&channel).is_some())
        })
    }

    pub fn is_registered(&self, channel: ChannelId) -> bool {
        self.handler(channel).is_some()
    }

    /// Number of registered channels.
    ///
    /// The registry is only borrowed mutably inside `register_channel` and
    /// `unregister_channel`, which call no handler code, so the count is
    /// observable from anywhere, handlers included. A borrow conflict would
    /// read as 0.
    pub fn len(&self) -> usize {
        self.channels
            .lock(|cell| cell.try_borrow().map(|c| c.len()).unwrap_or(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handler(&self, channel: ChannelId) -> Option<&'h dyn ChannelHandler> {
        self.channels.lock(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|channels| channels.get(&channel).copied())
        })
    }

    /// Decode a written value and dispatch its commands in order.
    pub fn route(&self, value: &[u8]) -> Result<RouteSummary, RouteError> {
        let mut summary = RouteSummary::default();

        let text = protocol::decode(value).map_err(|error| {
            warn!("ROUTER: dropping {} byte write: {:?}", value.len(), error);
            RouteError::Decode {
                error,
                dispatched: 0,
            }
        })?;

        for command in protocol::parse_commands(text) {
            let command = command.map_err(|error| {
                warn!(
                    "ROUTER: aborting batch after {} commands: {:?}",
                    summary.dispatched, error
                );
                RouteError::Decode {
                    error,
                    dispatched: summary.dispatched,
                }
            })?;

            let handler = match self.handler(command.channel) {
                Some(handler) => handler,
                None => {
                    warn!("ROUTER: unhandled channel {}", command.channel);
                    summary.unhandled += 1;
                    continue;
                }
            };

            trace!("ROUTER: channel {} <- '{}'", command.channel, command.data);
            handler
                .on_data(command.channel, command.data)
                .map_err(|error| {
                    warn!(
                        "ROUTER: channel {} handler failed: {:?}",
                        command.channel, error
                    );
                    RouteError::Handler {
                        channel: command.channel,
                        error,
                        dispatched: summary.dispatched,
                    }
                })?;
            summary.dispatched += 1;
        }

        Ok(summary)
    }
}

impl<'h, M: RawMutex> Default for ChannelRouter<'h, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h, M: RawMutex> WriteHandler for ChannelRouter<'h, M> {
    fn on_write(
        &self,
        conn_handle: ConnHandle,
        _characteristic: &Characteristic<'_>,
        value: &[u8],
    ) -> Result<(), HandlerError> {
        trace!("ROUTER: {} bytes from connection {}", value.len(), conn_handle);
        self.route(value).map(|_| ()).map_err(HandlerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::cell::RefCell as StdRefCell;
    use std::string::{String, ToString};
    use std::vec::Vec;

    /// Records every `(channel, data)` it receives.
    #[derive(Default)]
    struct Recorder {
        seen: StdRefCell<Vec<(ChannelId, String)>>,
    }

    impl ChannelHandler for Recorder {
        fn on_data(&self, channel: ChannelId, data: &str) -> Result<(), HandlerError> {
            self.seen.borrow_mut().push((channel, data.to_string()));
            Ok(())
        }
    }

    impl Recorder {
        fn seen(&self) -> Vec<(ChannelId, String)> {
            self.seen.borrow().clone()
        }
    }

    struct Failing;

    impl ChannelHandler for Failing {
        fn on_data(&self, _channel: ChannelId, _data: &str) -> Result<(), HandlerError> {
            Err(HandlerError::Failed)
        }
    }

    fn pairs(items: &[(ChannelId, &str)]) -> Vec<(ChannelId, String)> {
        items.iter().map(|(c, d)| (*c, d.to_string())).collect()
    }

    #[test]
    fn test_dispatch_in_order() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        for channel in 1..=3 {
            router.register_channel(channel, &recorder).unwrap();
        }

        let summary = router.route(b"1:up;2:left;3:").unwrap();
        assert_eq!(summary, RouteSummary { dispatched: 3, unhandled: 0 });
        assert_eq!(recorder.seen(), pairs(&[(1, "up"), (2, "left"), (3, "")]));
    }

    #[test]
    fn test_bad_first_segment_dispatches_nothing() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(1, &recorder).unwrap();

        let err = router.route(b"x:bad;1:up").unwrap_err();
        assert_eq!(
            err,
            RouteError::Decode {
                error: DecodeError::InvalidChannel,
                dispatched: 0
            }
        );
        assert!(recorder.seen().is_empty());
    }

    #[test]
    fn test_abort_keeps_earlier_dispatches() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(1, &recorder).unwrap();
        router.register_channel(2, &recorder).unwrap();

        let err = router.route(b"1:a;nocolon;2:b").unwrap_err();
        assert_eq!(err.dispatched(), 1);
        assert_eq!(recorder.seen(), pairs(&[(1, "a")]));
    }

    #[test]
    fn test_invalid_utf8_dispatches_nothing() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(1, &recorder).unwrap();

        let err = router.route(&[b'1', b':', 0xff, b';', b'1', b':', b'x']).unwrap_err();
        assert_eq!(
            err,
            RouteError::Decode {
                error: DecodeError::InvalidUtf8,
                dispatched: 0
            }
        );
        assert!(recorder.seen().is_empty());
    }

    #[test]
    fn test_unhandled_channel_continues() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(2, &recorder).unwrap();

        let summary = router.route(b"9:lost;2:kept").unwrap();
        assert_eq!(summary, RouteSummary { dispatched: 1, unhandled: 1 });
        assert_eq!(recorder.seen(), pairs(&[(2, "kept")]));
    }

    #[test]
    fn test_handler_error_aborts_batch() {
        let recorder = Recorder::default();
        let failing = Failing;
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(1, &failing).unwrap();
        router.register_channel(2, &recorder).unwrap();

        let err = router.route(b"2:a;1:boom;2:b").unwrap_err();
        assert_eq!(
            err,
            RouteError::Handler {
                channel: 1,
                error: HandlerError::Failed,
                dispatched: 1
            }
        );
        assert_eq!(recorder.seen(), pairs(&[(2, "a")]));
        assert_eq!(HandlerError::from(err), HandlerError::Failed);
    }

    #[test]
    fn test_last_registration_wins() {
        let first = Recorder::default();
        let second = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(5, &first).unwrap();
        router.register_channel(5, &second).unwrap();
        assert_eq!(router.len(), 1);

        router.route(b"5:hi").unwrap();
        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), pairs(&[(5, "hi")]));
    }

    #[test]
    fn test_unregister() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(1, &recorder).unwrap();
        assert!(router.is_registered(1));

        assert_eq!(router.unregister_channel(1), Ok(true));
        assert_eq!(router.unregister_channel(1), Ok(false));
        assert!(!router.is_registered(1));
        assert!(router.is_empty());
    }

    #[test]
    fn test_channel_capacity() {
        let recorder = Recorder::default();
        let router: ChannelRouter = ChannelRouter::new();
        for channel in 0..MAX_CHANNELS as ChannelId {
            router.register_channel(channel, &recorder).unwrap();
        }
        assert_eq!(router.register_channel(100, &recorder), Err(Error::ChannelsFull));
        // Replacing an existing channel still works when full
        assert!(router.register_channel(0, &recorder).is_ok());
    }

    /// Registers channel 2 the first time channel 1 fires.
    struct Installer {
        router: &'static ChannelRouter<'static>,
        target: &'static Recorder,
    }

    impl ChannelHandler for Installer {
        fn on_data(&self, _channel: ChannelId, _data: &str) -> Result<(), HandlerError> {
            self.router
                .register_channel(2, self.target)
                .map_err(|_| HandlerError::Failed)
        }
    }

    #[test]
    fn test_register_from_inside_handler() {
        let router: &'static ChannelRouter<'static> = Box::leak(Box::new(ChannelRouter::new()));
        let target: &'static Recorder = Box::leak(Box::new(Recorder::default()));
        let installer: &'static Installer = Box::leak(Box::new(Installer { router, target }));
        router.register_channel(1, installer).unwrap();

        // Channel 2 is installed mid-batch and receives the next command
        let summary = router.route(b"1:install;2:now").unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(target.seen(), pairs(&[(2, "now")]));
    }

    /// Remembers how many channels were registered when it ran.
    struct Census {
        router: &'static ChannelRouter<'static>,
        seen: core::cell::Cell<Option<usize>>,
    }

    impl ChannelHandler for Census {
        fn on_data(&self, _channel: ChannelId, _data: &str) -> Result<(), HandlerError> {
            self.seen.set(Some(self.router.len()));
            Ok(())
        }
    }

    #[test]
    fn test_len_from_inside_handler() {
        let router: &'static ChannelRouter<'static> = Box::leak(Box::new(ChannelRouter::new()));
        let census: &'static Census = Box::leak(Box::new(Census {
            router,
            seen: core::cell::Cell::new(None),
        }));
        let idle: &'static Recorder = Box::leak(Box::new(Recorder::default()));
        router.register_channel(1, census).unwrap();
        router.register_channel(2, idle).unwrap();

        router.route(b"1:count").unwrap();
        assert_eq!(census.seen.get(), Some(2));
    }

    #[test]
    fn test_closure_handler() {
        let count = core::cell::Cell::new(0);
        let counter = |_channel: ChannelId, data: &str| -> Result<(), HandlerError> {
            count.set(count.get() + data.len());
            Ok(())
        };
        let router: ChannelRouter = ChannelRouter::new();
        router.register_channel(3, &counter).unwrap();

        router.route(b"3:abc;3:de").unwrap();
        assert_eq!(count.get(), 5);
    }
}
