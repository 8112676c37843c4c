use crate::Tag;
use crate::region::FlashStep;
use thiserror::Error;

/// Errors that can occur while saving or loading state. None of them are fatal: the device keeps
/// running with whatever state the suppliers held before the call.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The requested window does not fit below the reserved top of flash, or the flash geometry
    /// is not sector/word aligned.
    #[error("invalid flash region")]
    InvalidRegion,

    /// A record would not fit into the state buffer. Nothing is written to flash.
    #[error("capacity exceeded by {tag:?}: {required} words required, {available} available")]
    CapacityExceeded {
        tag: Tag,
        required: usize,
        available: usize,
    },

    /// The all-zero tag terminates the record stream and can't be used by a supplier.
    #[error("reserved tag")]
    ReservedTag,

    /// A supplier was mutably borrowed while the state was being assembled.
    #[error("supplier busy")]
    SupplierBusy,

    /// The internal error value is returned from the provided `NorFlash`. The content of the
    /// window is undefined afterward and will most likely be rejected by the next load.
    #[error("flash write failed during {0}")]
    FlashWriteFailed(FlashStep),

    /// The other execution contexts could not be parked in time, the step was not attempted.
    #[error("flash barrier timed out before {0}")]
    BarrierTimeout(FlashStep),

    #[error("flash read failed")]
    FlashReadFailed,

    /// The window does not hold state written by this application, or was never written.
    #[error("application identity mismatch: found {found:#010x}, expected {expected:#010x}")]
    IdentityMismatch { found: i32, expected: i32 },

    /// The stored length of a record runs past the end of the window. Records before it have
    /// already been applied.
    #[error("truncated record {tag:?} at word {offset} with length {len}")]
    TruncatedRecord { tag: Tag, offset: usize, len: i32 },

    /// Only returned with [`VersionPolicy::Reject`](crate::VersionPolicy::Reject).
    #[error("version mismatch for {tag:?}: stored {stored}, expected {expected}")]
    VersionMismatch {
        tag: Tag,
        stored: i32,
        expected: i32,
    },
}
