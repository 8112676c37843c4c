//! Encoding and decoding of the tagged record stream.
//!
//! ```text
//! word[0]            = application identity
//! word[1]            = tag_1   (0 terminates)
//! word[2]            = version_1
//! word[3]            = len_1
//! word[4 .. 4+len_1) = state words of supplier 1
//! word[4+len_1]      = tag_2
//! ...
//! ```

use crate::error::Error;
use crate::{RECORD_HEADER_WORDS, Tag};
use core::iter::FusedIterator;

/// One decoded record, borrowing its payload from the state buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub tag: Tag,
    pub version: i32,
    pub payload: &'a [i32],
}

/// Appends records to a word buffer. A record is either written completely or not at all.
pub struct RecordWriter<'a> {
    words: &'a mut [i32],
    cursor: usize,
}

impl<'a> RecordWriter<'a> {
    /// Starts writing at word `cursor` of `words`.
    pub fn new(words: &'a mut [i32], cursor: usize) -> Self {
        Self { words, cursor }
    }

    /// Index of the next word to be written.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.words.len().saturating_sub(self.cursor)
    }

    pub fn push(&mut self, tag: Tag, version: i32, state: &[i32]) -> Result<(), Error> {
        if tag.is_terminator() {
            return Err(Error::ReservedTag);
        }

        let required = RECORD_HEADER_WORDS + state.len();
        let available = self.remaining();
        let exceeded = Error::CapacityExceeded {
            tag,
            required,
            available,
        };
        if required > available {
            return Err(exceeded);
        }
        let len = i32::try_from(state.len()).map_err(|_| exceeded)?;

        let record = &mut self.words[self.cursor..self.cursor + required];
        let (header, payload) = record.split_at_mut(RECORD_HEADER_WORDS);
        header.copy_from_slice(&[tag.as_raw(), version, len]);
        payload.copy_from_slice(state);

        self.cursor += required;
        Ok(())
    }
}

/// Walks the records of a word buffer until the terminator tag or the end of the buffer.
///
/// Yields an [`Error::TruncatedRecord`] once if a record claims more words than are left and
/// stops afterward.
pub struct RecordReader<'a> {
    words: &'a [i32],
    cursor: usize,
    done: bool,
}

impl<'a> RecordReader<'a> {
    /// Starts reading at word `cursor` of `words`.
    pub fn new(words: &'a [i32], cursor: usize) -> Self {
        Self {
            words,
            cursor,
            done: false,
        }
    }

    fn truncated(
        &mut self,
        tag: Tag,
        offset: usize,
        len: i32,
    ) -> Option<Result<Record<'a>, Error>> {
        self.done = true;
        Some(Err(Error::TruncatedRecord { tag, offset, len }))
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let offset = self.cursor;
        let tag = match self.words.get(offset) {
            Some(&raw) if raw != Tag::TERMINATOR.as_raw() => Tag::from_raw(raw),
            _ => {
                self.done = true;
                return None;
            }
        };

        let start = offset + RECORD_HEADER_WORDS;
        let Some(&[version, len]) = self.words.get(offset + 1..start) else {
            return self.truncated(tag, offset, 0);
        };

        let payload = usize::try_from(len)
            .ok()
            .and_then(|n| self.words.get(start..start.checked_add(n)?));
        let Some(payload) = payload else {
            return self.truncated(tag, offset, len);
        };

        self.cursor = start + payload.len();
        Some(Ok(Record {
            tag,
            version,
            payload,
        }))
    }
}

impl FusedIterator for RecordReader<'_> {}
