use alloc::vec;
use alloc::vec::Vec;

/// Staging area for save and load, exactly as long as the flash window. The length never changes
/// after construction.
pub(crate) struct StateBuffer {
    words: Vec<i32>,
}

impl StateBuffer {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            words: vec![0; len],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.words.fill(0);
    }

    pub(crate) fn as_slice(&self) -> &[i32] {
        &self.words
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.words
    }
}
