#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

mod buffer;
pub mod error;
mod manager;
pub mod platform;
pub mod record;
pub mod region;
mod registry;

extern crate alloc;

use core::fmt;

pub use manager::{
    Config, LoadReport, RecordOutcome, RecordStatus, SavedStateManager, VersionPolicy,
};
pub use registry::{Registry, StateSupplier, SupplierRef};

/// Every value in the flash window is a native-endian `i32`.
pub(crate) const WORD_SIZE: usize = core::mem::size_of::<i32>();

/// Tag, version and length precede the payload of every record.
pub(crate) const RECORD_HEADER_WORDS: usize = 3;

/// Word index of the application identity, records follow directly after it.
pub(crate) const IDENTITY_WORD: usize = 0;

/// Tags are at most 4 ASCII characters packed into one word.
const MAX_TAG_LENGTH: usize = WORD_SIZE;

/// A 32-bit supplier identifier, usually a 4 character code such as `b"SPIO"`.
///
/// The first character is stored in the least significant byte, which matches the in-memory
/// byte order on the little-endian targets this crate is used on. The all-zero tag terminates
/// a record stream and can not be saved.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tag(i32);

impl Tag {
    /// Marks the end of the records in a saved state blob.
    pub const TERMINATOR: Tag = Tag(0);

    /// Creates a tag from up to 4 bytes, shorter codes are padded with null bytes.
    ///
    /// Usage: `Tag::from_array(b"SPIO")`
    ///
    /// Tip: use a const context to ensure that the tag is built at compile time:
    ///   `const SPIO: Tag = Tag::from_array(b"SPIO");`
    pub const fn from_array<const M: usize>(src: &[u8; M]) -> Self {
        assert!(M <= MAX_TAG_LENGTH);
        Self::from_slice(src)
    }

    /// Creates a tag from up to 4 bytes, shorter codes are padded with null bytes.
    pub const fn from_slice(src: &[u8]) -> Self {
        assert!(src.len() <= MAX_TAG_LENGTH);
        let mut dst = [0u8; MAX_TAG_LENGTH];
        let mut i = 0;
        while i < src.len() {
            dst[i] = src[i];
            i += 1;
        }
        Self(i32::from_le_bytes(dst))
    }

    /// Usage: `Tag::from_str("MENU")`
    pub const fn from_str(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }

    /// Wraps a raw word as read from flash.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// The 4 characters of the code, first character first.
    pub const fn to_bytes(self) -> [u8; MAX_TAG_LENGTH] {
        self.0.to_le_bytes()
    }

    pub const fn is_terminator(self) -> bool {
        self.0 == Self::TERMINATOR.0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(b\"")?;

        for byte in self.to_bytes() {
            if byte == 0 {
                write!(f, "\\0")?;
                continue;
            }

            write!(f, "{}", core::ascii::escape_default(byte))?;
        }

        write!(f, "\")")
    }
}

impl From<Tag> for i32 {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}
