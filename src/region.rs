//! Location and raw I/O of the flash window that holds the saved state.

use crate::WORD_SIZE;
use crate::error::Error;
use crate::platform::{Platform, align_ceil};
use core::ops::Range;
#[cfg(feature = "defmt")]
use defmt::trace;

/// The UF2 bootloader systematically erases the last sector of the flash (RP2350-E10), so by
/// default the window ends right below it. Other chips have their own layout, see
/// [`Config::with_reserved_top`](crate::Config::with_reserved_top).
pub const DEFAULT_RESERVED_TOP: usize = 4096;

/// Bytes moved per `read`/`write` call. Has to be a multiple of the read and write size of the
/// flash.
pub(crate) const TRANSFER_CHUNK_SIZE: usize = 256;
const TRANSFER_CHUNK_WORDS: usize = TRANSFER_CHUNK_SIZE / WORD_SIZE;

/// The two physical steps of a save, each executed behind the flash barrier.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashStep {
    Erase,
    Program,
}

/// A sector aligned window at the top of the flash, sized to hold `max_state_words` words.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    offset: u32,
    size: usize,
}

impl FlashRegion {
    /// Places a window of `max_state_words` words, rounded up to whole sectors, directly below
    /// the `reserved_top` bytes at the end of a flash with `flash_capacity` bytes.
    ///
    /// ```
    /// use flash_saved_state::region::FlashRegion;
    ///
    /// let region = FlashRegion::new(2 * 1024 * 1024, 4096, 4096, 1025).unwrap();
    /// assert_eq!(region.size(), 8192);
    /// assert_eq!(region.offset(), 2 * 1024 * 1024 - 4096 - 8192);
    /// ```
    pub fn new(
        flash_capacity: usize,
        sector_size: usize,
        reserved_top: usize,
        max_state_words: usize,
    ) -> Result<Self, Error> {
        if sector_size == 0 || !sector_size.is_multiple_of(WORD_SIZE) {
            return Err(Error::InvalidRegion);
        }

        if !flash_capacity.is_multiple_of(sector_size) || !reserved_top.is_multiple_of(sector_size)
        {
            return Err(Error::InvalidRegion);
        }

        // one word for the application identity is the bare minimum
        if max_state_words == 0 {
            return Err(Error::InvalidRegion);
        }

        let bytes = max_state_words
            .checked_mul(WORD_SIZE)
            .ok_or(Error::InvalidRegion)?;
        let size = align_ceil(bytes, sector_size);
        if size < bytes {
            return Err(Error::InvalidRegion);
        }

        let end = flash_capacity
            .checked_sub(reserved_top)
            .ok_or(Error::InvalidRegion)?;
        let offset = end.checked_sub(size).ok_or(Error::InvalidRegion)?;

        // the end address has to be representable as well for the erase call
        u32::try_from(end).map_err(|_| Error::InvalidRegion)?;
        let offset = u32::try_from(offset).map_err(|_| Error::InvalidRegion)?;

        Ok(Self { offset, size })
    }

    /// Same as [`FlashRegion::new`] with the capacity and sector size taken from the flash.
    pub fn for_flash<T: Platform>(
        flash: &T,
        reserved_top: usize,
        max_state_words: usize,
    ) -> Result<Self, Error> {
        if !TRANSFER_CHUNK_SIZE.is_multiple_of(T::READ_SIZE)
            || !TRANSFER_CHUNK_SIZE.is_multiple_of(T::WRITE_SIZE)
        {
            return Err(Error::InvalidRegion);
        }

        let region = Self::new(
            flash.capacity(),
            T::ERASE_SIZE,
            reserved_top,
            max_state_words,
        )?;

        #[cfg(feature = "defmt")]
        trace!("region: @{:#08x}[{:#x}]", region.offset, region.size);

        Ok(region)
    }

    /// Byte offset of the window from the start of the flash.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Size of the window in bytes, always a multiple of the sector size.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of words that fit into the window.
    pub const fn words(&self) -> usize {
        self.size / WORD_SIZE
    }

    pub fn range(&self) -> Range<u32> {
        // fits, checked on construction
        self.offset..self.offset + self.size as u32
    }

    /// Copies the whole window into `words`, which must hold exactly [`FlashRegion::words`]
    /// entries.
    pub(crate) fn read_into<T: Platform>(
        &self,
        flash: &mut T,
        words: &mut [i32],
    ) -> Result<(), Error> {
        debug_assert_eq!(words.len(), self.words());

        let mut chunk = [0u8; TRANSFER_CHUNK_SIZE];
        for (index, dst) in words.chunks_mut(TRANSFER_CHUNK_WORDS).enumerate() {
            let bytes = &mut chunk[..dst.len() * WORD_SIZE];
            let address = self.offset + (index * TRANSFER_CHUNK_SIZE) as u32;

            flash
                .read(address, bytes)
                .map_err(|_| Error::FlashReadFailed)?;

            for (word, raw) in dst.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
                *word = i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
        }

        Ok(())
    }

    pub(crate) fn erase<T: Platform>(&self, flash: &mut T) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase: @{:#08x}[{:#x}]", self.offset, self.size);

        #[cfg(feature = "debug-logs")]
        println!("  FlashRegion: erase {:#08x}[{:#x}]", self.offset, self.size);

        let range = self.range();
        flash
            .erase(range.start, range.end)
            .map_err(|_| Error::FlashWriteFailed(FlashStep::Erase))
    }

    /// Programs `words` to the previously erased window.
    pub(crate) fn program<T: Platform>(&self, flash: &mut T, words: &[i32]) -> Result<(), Error> {
        debug_assert_eq!(words.len(), self.words());

        #[cfg(feature = "defmt")]
        trace!("program: @{:#08x}[{:#x}]", self.offset, self.size);

        #[cfg(feature = "debug-logs")]
        println!("  FlashRegion: program {:#08x}[{:#x}]", self.offset, self.size);

        let mut chunk = [0u8; TRANSFER_CHUNK_SIZE];
        for (index, src) in words.chunks(TRANSFER_CHUNK_WORDS).enumerate() {
            let bytes = &mut chunk[..src.len() * WORD_SIZE];
            for (raw, word) in bytes.chunks_exact_mut(WORD_SIZE).zip(src) {
                raw.copy_from_slice(&word.to_ne_bytes());
            }

            let address = self.offset + (index * TRANSFER_CHUNK_SIZE) as u32;
            flash
                .write(address, bytes)
                .map_err(|_| Error::FlashWriteFailed(FlashStep::Program))?;
        }

        Ok(())
    }
}
