#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use flash_saved_state::platform::{BarrierTimeout, SafeExecute};
use flash_saved_state::{Config, StateSupplier, Tag};

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;
pub const SECTORS: usize = 4;

/// Window of 1024 words right below the reserved last sector.
pub const REGION_OFFSET: usize = FLASH_SECTOR_SIZE * (SECTORS - 2);
pub const REGION_WORDS: usize = FLASH_SECTOR_SIZE / WORD_SIZE;

pub const APP_ID: i32 = Tag::from_array(b"TEST").as_raw();

pub fn config() -> Config {
    Config::new(APP_ID)
}

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(sectors: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * sectors],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(sectors: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * sectors],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    /// The saved state window as native-endian words.
    pub fn region_words(&self) -> Vec<i32> {
        self.buf[REGION_OFFSET..REGION_OFFSET + FLASH_SECTOR_SIZE]
            .chunks_exact(WORD_SIZE)
            .map(|raw| i32::from_ne_bytes(raw.try_into().unwrap()))
            .collect()
    }

    /// Overwrites a word of the window, bypassing the NOR semantics.
    pub fn poke_word(&mut self, index: usize, value: i32) {
        let offset = REGION_OFFSET + index * WORD_SIZE;
        self.buf[offset..offset + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn fault(&self) -> Result<(), FlashError> {
        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT");
            return Err(FlashError);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));

        println!(
            "    flash: read:  0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        self.fault()?;
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        println!(
            "    flash: erase: {from:04X} - {to:04X} #{:>2}",
            self.operations.len()
        );
        self.fault()?;
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));
        assert!(!bytes.is_empty());

        println!(
            "    flash: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        self.fault()?;
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

/// Simulates the multicore barrier. `busy` makes every call time out.
#[derive(Default)]
pub struct Barrier {
    pub busy: bool,
    pub calls: usize,
    pub timeouts: Vec<u32>,
}

impl SafeExecute for Barrier {
    fn safe_execute<R>(
        &mut self,
        timeout_ms: u32,
        op: impl FnOnce() -> R,
    ) -> Result<R, BarrierTimeout> {
        self.calls += 1;
        self.timeouts.push(timeout_ms);
        if self.busy {
            return Err(BarrierTimeout);
        }
        Ok(op())
    }
}

/// A supplier that accepts any payload of `expected_len` words, or any payload at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Supplier {
    pub tag: Tag,
    pub version: i32,
    pub state: Vec<i32>,
    pub expected_len: Option<usize>,
    pub restores: usize,
}

impl Supplier {
    pub fn new(tag: Tag, state: &[i32]) -> Self {
        Self {
            tag,
            version: 1,
            state: state.to_vec(),
            expected_len: None,
            restores: 0,
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn with_expected_len(mut self, expected_len: usize) -> Self {
        self.expected_len = Some(expected_len);
        self
    }
}

impl StateSupplier for Supplier {
    fn tag(&self) -> Tag {
        self.tag
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn saved_state(&self) -> Vec<i32> {
        self.state.clone()
    }

    fn restore_state(&mut self, state: &[i32]) -> bool {
        if self.expected_len.is_some_and(|len| len != state.len()) {
            return false;
        }
        self.state = state.to_vec();
        self.restores += 1;
        true
    }
}
