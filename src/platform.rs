use embedded_storage::nor_flash::NorFlash;

/// Any `NorFlash` implementation can hold saved state. See README.md for an example.
pub trait Platform: NorFlash {}

impl<T: NorFlash> Platform for T {}

/// The other execution contexts could not be quiesced within the requested time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BarrierTimeout;

/// Runs flash erase and program operations while nothing else executes from flash.
///
/// Flash is execute-in-place on the supported targets. Any code fetched from flash while an erase
/// or program is in flight, be it an interrupt handler or the main loop of the other core, crashes
/// the device or reads garbage. Implementations park every other execution context, run `op` and
/// release them again.
///
/// `timeout_ms` bounds how long to wait for the other contexts to park, `u32::MAX` waits forever.
/// When the bound is exceeded `op` must not be called.
pub trait SafeExecute {
    fn safe_execute<R>(
        &mut self,
        timeout_ms: u32,
        op: impl FnOnce() -> R,
    ) -> Result<R, BarrierTimeout>;
}

impl<T: SafeExecute> SafeExecute for &mut T {
    fn safe_execute<R>(
        &mut self,
        timeout_ms: u32,
        op: impl FnOnce() -> R,
    ) -> Result<R, BarrierTimeout> {
        (**self).safe_execute(timeout_ms, op)
    }
}

/// Barrier for platforms with a single execution context that does not run from flash while
/// erasing, e.g. a single core firmware with interrupts that live in RAM.
#[derive(Debug, Default, Copy, Clone)]
pub struct Unguarded;

impl SafeExecute for Unguarded {
    fn safe_execute<R>(
        &mut self,
        _timeout_ms: u32,
        op: impl FnOnce() -> R,
    ) -> Result<R, BarrierTimeout> {
        Ok(op())
    }
}

#[inline(always)]
pub(crate) const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
mod chip {
    use crate::SavedStateManager;
    use crate::platform::Unguarded;
    use esp_storage::FlashStorage;

    /// Manager on top of esp-storage, which suspends the flash cache around every ROM flash
    /// call. Whether the other core is stopped as well depends on the multicore strategy
    /// esp-storage was configured with; pass a real barrier to
    /// [`SavedStateManager::with_barrier`] if the second core executes from flash.
    ///
    /// The default [`Config`](crate::Config) reserves the last sector for the RP2350 bootloader.
    /// On ESP chips the partition table decides what lives at the top of the flash, so derive
    /// `with_reserved_top` and `with_max_state_words` from the partition reserved for the state.
    pub type EspSavedStateManager<'a, 'd> = SavedStateManager<'a, FlashStorage<'d>, Unguarded>;
}

#[cfg(any(
    feature = "esp32",
    feature = "esp32s2",
    feature = "esp32s3",
    feature = "esp32c2",
    feature = "esp32c3",
    feature = "esp32c6",
    feature = "esp32h2",
))]
pub use chip::*;
