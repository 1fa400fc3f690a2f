//! Error types shared across the crate.
//!
//! No variant carries heap data, so every error is `Copy` and can be logged
//! from inside the radio callback without allocating.

use core::fmt;

/// Top-level error returned by setup and application-facing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Configuration
    /// UUID string is neither a 16-bit nor a 128-bit UUID.
    InvalidUuid,
    /// Characteristic property mask is empty.
    InvalidProperties,
    /// Device name does not fit the scan response.
    NameTooLong,

    // Capacity
    /// Advertising payload already carries the maximum number of UUIDs.
    AdvertisingFull,
    /// Service table is full.
    ServicesFull,
    /// Service already holds the maximum number of characteristics.
    CharacteristicsFull,
    /// Handle registry is full.
    HandleRegistryFull,
    /// Channel registry is full.
    ChannelsFull,
    /// Value exceeds the characteristic value buffer.
    ValueTooLarge,
    /// Outbound notification queue is full.
    QueueFull,

    // Lookup
    /// No registered characteristic matches the UUID.
    NotFound,
    /// Registry is being dispatched and cannot be modified right now.
    Busy,

    // Radio
    /// The radio stack rejected a call.
    Radio(RadioError),
}

/// Failures reported by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Raw error code from the stack.
    Raw(u32),
    /// Stack ran out of attribute table / buffer space.
    NoResources,
    /// Call is not valid in the current stack state.
    InvalidState,
    /// Parameter was rejected (e.g. unsupported TX power level).
    InvalidParam,
    /// Operation is not supported by this stack.
    Unsupported,
    /// Stored value (of the given length) does not fit the caller's buffer.
    ValueTooLarge(usize),
}

/// Failure of a write handler or channel handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerError {
    /// Written bytes could not be decoded.
    Decode(DecodeError),
    /// Handler understood the payload but refused it.
    InvalidData,
    /// Handler failed while acting on the payload.
    Failed,
}

/// Channel protocol decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Written value is not valid UTF-8.
    InvalidUtf8,
    /// Segment has no `:` between channel and data.
    MissingSeparator,
    /// Channel token is not an integer.
    InvalidChannel,
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Error::Radio(e)
    }
}

impl From<DecodeError> for HandlerError {
    fn from(e: DecodeError) -> Self {
        HandlerError::Decode(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUuid => f.write_str("invalid UUID"),
            Error::InvalidProperties => f.write_str("invalid characteristic properties"),
            Error::NameTooLong => f.write_str("device name too long"),
            Error::AdvertisingFull => f.write_str("advertising UUID list full"),
            Error::ServicesFull => f.write_str("service table full"),
            Error::CharacteristicsFull => f.write_str("characteristic table full"),
            Error::HandleRegistryFull => f.write_str("handle registry full"),
            Error::ChannelsFull => f.write_str("channel registry full"),
            Error::ValueTooLarge => f.write_str("value too large"),
            Error::QueueFull => f.write_str("notification queue full"),
            Error::NotFound => f.write_str("characteristic not found"),
            Error::Busy => f.write_str("registry busy"),
            Error::Radio(e) => write!(f, "radio error: {}", e),
        }
    }
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::Raw(code) => write!(f, "stack error 0x{:x}", code),
            RadioError::NoResources => f.write_str("no resources"),
            RadioError::InvalidState => f.write_str("invalid state"),
            RadioError::InvalidParam => f.write_str("invalid parameter"),
            RadioError::Unsupported => f.write_str("unsupported"),
            RadioError::ValueTooLarge(len) => write!(f, "stored value is {} bytes", len),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Decode(e) => write!(f, "decode error: {}", e),
            HandlerError::InvalidData => f.write_str("invalid data"),
            HandlerError::Failed => f.write_str("handler failed"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidUtf8 => f.write_str("value is not UTF-8"),
            DecodeError::MissingSeparator => f.write_str("missing ':' separator"),
            DecodeError::InvalidChannel => f.write_str("invalid channel type"),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
