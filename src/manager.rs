use crate::buffer::StateBuffer;
use crate::error::Error;
use crate::platform::{Platform, SafeExecute, Unguarded};
use crate::record::{Record, RecordReader, RecordWriter};
use crate::region::{DEFAULT_RESERVED_TOP, FlashRegion, FlashStep};
use crate::registry::{Registry, SupplierRef};
use crate::{IDENTITY_WORD, Tag};
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::{debug, trace, warn};

/// What to do with a record whose supplier has moved on to a different version.
#[derive(strum::Display, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VersionPolicy {
    /// Leave the supplier untouched and continue with the next record.
    #[default]
    Skip,
    /// Abort the load with [`Error::VersionMismatch`]. Records before the stale one stay applied.
    Reject,
}

/// Settings of a [`SavedStateManager`], fixed at construction.
///
/// ```
/// use flash_saved_state::{Config, Tag, VersionPolicy};
///
/// const CONFIG: Config = Config::new(Tag::from_array(b"LEDS").as_raw())
///     .with_max_state_words(256)
///     .with_version_policy(VersionPolicy::Reject);
/// assert_eq!(CONFIG.barrier_timeout_ms, u32::MAX);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Leading magic word that identifies state written by this application.
    pub application_id: i32,
    /// Capacity of the state buffer in words, rounded up to whole flash sectors.
    pub max_state_words: usize,
    /// Bytes at the top of the flash the window must stay clear of.
    pub reserved_top: usize,
    /// Handed to [`SafeExecute::safe_execute`] for both the erase and the program step.
    pub barrier_timeout_ms: u32,
    pub version_policy: VersionPolicy,
}

impl Config {
    pub const DEFAULT_MAX_STATE_WORDS: usize = 1024;

    pub const fn new(application_id: i32) -> Self {
        Self {
            application_id,
            max_state_words: Self::DEFAULT_MAX_STATE_WORDS,
            reserved_top: DEFAULT_RESERVED_TOP,
            barrier_timeout_ms: u32::MAX,
            version_policy: VersionPolicy::Skip,
        }
    }

    pub const fn with_max_state_words(mut self, max_state_words: usize) -> Self {
        self.max_state_words = max_state_words;
        self
    }

    pub const fn with_reserved_top(mut self, reserved_top: usize) -> Self {
        self.reserved_top = reserved_top;
        self
    }

    pub const fn with_barrier_timeout_ms(mut self, barrier_timeout_ms: u32) -> Self {
        self.barrier_timeout_ms = barrier_timeout_ms;
        self
    }

    pub const fn with_version_policy(mut self, version_policy: VersionPolicy) -> Self {
        self.version_policy = version_policy;
        self
    }
}

/// What happened to a single record during a load.
#[derive(strum::Display, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordStatus {
    /// The supplier adopted the payload.
    Loaded,
    /// The supplier refused the payload, usually because of a wrong word count.
    Rejected,
    /// The supplier runs a different version than the stored record and was skipped.
    VersionMismatch { expected: i32 },
    /// No registered supplier carries the tag, e.g. because it was retired.
    UnknownTag,
    /// At least one supplier was borrowed elsewhere and could not be checked.
    Busy,
}

impl RecordStatus {
    /// Orders the outcomes of suppliers sharing a tag, the record reports the strongest one.
    const fn rank(&self) -> u8 {
        match self {
            Self::Loaded => 4,
            Self::Rejected => 3,
            Self::VersionMismatch { .. } => 2,
            Self::Busy => 1,
            Self::UnknownTag => 0,
        }
    }

    fn merge(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordOutcome {
    pub tag: Tag,
    pub version: i32,
    pub len: usize,
    pub status: RecordStatus,
}

/// Per record summary of a successful load, in flash order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadReport {
    records: Vec<RecordOutcome>,
}

impl LoadReport {
    pub fn records(&self) -> &[RecordOutcome] {
        &self.records
    }

    pub fn outcome(&self, tag: Tag) -> Option<&RecordOutcome> {
        self.records.iter().find(|record| record.tag == tag)
    }

    /// Number of records a supplier adopted.
    pub fn loaded(&self) -> usize {
        self.count(RecordStatus::Loaded)
    }

    /// Number of records a supplier refused.
    pub fn rejected(&self) -> usize {
        self.count(RecordStatus::Rejected)
    }

    fn count(&self, status: RecordStatus) -> usize {
        self.records
            .iter()
            .filter(|record| record.status == status)
            .count()
    }
}

/// Saves the state of all registered suppliers to a reserved flash window and restores it.
///
/// Both operations rebuild the state buffer from scratch, the flash window is the only durable
/// artifact. See README.md for a usage example.
pub struct SavedStateManager<'a, T: Platform, B: SafeExecute = Unguarded> {
    flash: T,
    barrier: B,
    config: Config,
    region: FlashRegion,
    buffer: StateBuffer,
    registry: Registry<'a>,
}

impl<'a, T: Platform> SavedStateManager<'a, T> {
    /// Creates a manager for a platform where nothing else executes from flash during a save.
    pub fn new(flash: T, config: Config) -> Result<Self, Error> {
        Self::with_barrier(flash, Unguarded, config)
    }
}

impl<'a, T: Platform, B: SafeExecute> SavedStateManager<'a, T, B> {
    /// Creates a manager that runs the erase and program steps through `barrier`.
    ///
    /// Fails with [`Error::InvalidRegion`] if the window does not fit into the flash.
    pub fn with_barrier(flash: T, barrier: B, config: Config) -> Result<Self, Error> {
        let region = FlashRegion::for_flash(&flash, config.reserved_top, config.max_state_words)?;
        let buffer = StateBuffer::new(region.words());

        Ok(Self {
            flash,
            barrier,
            config,
            region,
            buffer,
            registry: Registry::new(),
        })
    }

    /// Appends a supplier. The registration order is the save order.
    pub fn register_supplier(&mut self, supplier: SupplierRef<'a>) {
        self.registry.register(supplier);
    }

    pub fn registry(&self) -> &Registry<'a> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry<'a> {
        &mut self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }

    /// The state buffer as left by the last save or load.
    pub fn state(&self) -> &[i32] {
        self.buffer.as_slice()
    }

    /// Returns the flash and the barrier.
    pub fn into_inner(self) -> (T, B) {
        (self.flash, self.barrier)
    }

    /// Collects the state of every supplier and replaces the flash window with it.
    ///
    /// Nothing is written if a supplier doesn't fit. A failure during the erase or program step
    /// leaves the window in an undefined state, there is no rollback.
    pub fn save(&mut self) -> Result<(), Error> {
        self.buffer.clear();

        let words = self.buffer.as_mut_slice();
        words[IDENTITY_WORD] = self.config.application_id;

        let mut writer = RecordWriter::new(words, IDENTITY_WORD + 1);
        for supplier in self.registry.iter() {
            let supplier = supplier.try_borrow().map_err(|_| Error::SupplierBusy)?;
            let tag = supplier.tag();
            let state = supplier.saved_state();

            #[cfg(feature = "defmt")]
            trace!("save: {:?} v{} [{}]", tag, supplier.version(), state.len());

            #[cfg(feature = "debug-logs")]
            println!(
                "SavedStateManager: save {tag:?} v{} [{}]",
                supplier.version(),
                state.len()
            );

            writer.push(tag, supplier.version(), &state)?;
        }

        #[cfg(feature = "defmt")]
        debug!(
            "save: {} of {} words used",
            writer.cursor(),
            self.region.words()
        );

        self.write_region()
    }

    fn write_region(&mut self) -> Result<(), Error> {
        let Self {
            flash,
            barrier,
            config,
            region,
            buffer,
            ..
        } = self;
        let timeout_ms = config.barrier_timeout_ms;

        barrier
            .safe_execute(timeout_ms, || region.erase(&mut *flash))
            .map_err(|_| Error::BarrierTimeout(FlashStep::Erase))??;

        barrier
            .safe_execute(timeout_ms, || region.program(&mut *flash, buffer.as_slice()))
            .map_err(|_| Error::BarrierTimeout(FlashStep::Program))??;

        Ok(())
    }

    /// Reads the flash window and hands every record to the supplier with the matching tag.
    ///
    /// No supplier is touched if the window holds no state of this application. A truncated
    /// record aborts the load, but suppliers restored from earlier records keep their new state.
    pub fn load(&mut self) -> Result<LoadReport, Error> {
        self.region
            .read_into(&mut self.flash, self.buffer.as_mut_slice())?;

        let words = self.buffer.as_slice();
        let expected = self.config.application_id;
        let found = words[IDENTITY_WORD];
        if found != expected {
            #[cfg(feature = "defmt")]
            debug!("load: application id {=i32:#x} != {=i32:#x}", found, expected);

            #[cfg(feature = "debug-logs")]
            println!("SavedStateManager: application id {found:#010x} != {expected:#010x}");

            return Err(Error::IdentityMismatch { found, expected });
        }

        let mut report = LoadReport::default();
        for record in RecordReader::new(words, IDENTITY_WORD + 1) {
            let record = record?;
            let status = dispatch(&self.registry, self.config.version_policy, &record)?;

            #[cfg(feature = "defmt")]
            trace!(
                "load: {:?} v{} [{}] {}",
                record.tag,
                record.version,
                record.payload.len(),
                status
            );

            #[cfg(feature = "debug-logs")]
            println!(
                "SavedStateManager: state {:?}, ver={}, size={}, {status}",
                record.tag,
                record.version,
                record.payload.len()
            );

            report.records.push(RecordOutcome {
                tag: record.tag,
                version: record.version,
                len: record.payload.len(),
                status,
            });
        }

        Ok(report)
    }
}

/// Offers `record` to every supplier with a matching tag.
///
/// With duplicate tags every match receives the record and the strongest outcome is reported,
/// so a record adopted by one supplier counts as loaded.
fn dispatch(
    registry: &Registry<'_>,
    policy: VersionPolicy,
    record: &Record<'_>,
) -> Result<RecordStatus, Error> {
    let mut status = RecordStatus::UnknownTag;

    for handle in registry.iter() {
        let Ok(mut supplier) = handle.try_borrow_mut() else {
            status = status.merge(RecordStatus::Busy);
            continue;
        };

        if supplier.tag() != record.tag {
            continue;
        }

        let expected = supplier.version();
        if expected != record.version {
            if policy == VersionPolicy::Reject {
                return Err(Error::VersionMismatch {
                    tag: record.tag,
                    stored: record.version,
                    expected,
                });
            }
            status = status.merge(RecordStatus::VersionMismatch { expected });
            continue;
        }

        status = status.merge(if supplier.restore_state(record.payload) {
            RecordStatus::Loaded
        } else {
            #[cfg(feature = "defmt")]
            warn!("load: {:?} refused its state", record.tag);

            RecordStatus::Rejected
        });
    }

    Ok(status)
}
