//! Ring reader
//!
//! Pulls what the device stored in its receive ring during RUN mode. The
//! reader asks for the head once, then fetches every entry from its cursor
//! up to (not including) that head, one payload/timestamp request pair per
//! entry. The cursor only moves past entries that were actually read, so a
//! failed drain can be resumed.

use crate::backend::BridgeBackend;
use crate::controller::{ConfigController, PendingReply};
use crate::error::Result;
use sbio_chip::ring::RingIndex;
use tracing::debug;

/// One drained ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    /// Ring position
    pub index: RingIndex,
    /// Word the device received
    pub payload: u32,
    /// Device cycle timestamp
    pub timestamp: u32,
}

/// Cursor into the device's receive ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingReader {
    cursor: RingIndex,
}

impl RingReader {
    /// Reader at index 0
    pub const fn new() -> Self {
        Self {
            cursor: RingIndex::ZERO,
        }
    }

    /// Reader at `cursor`
    pub const fn starting_at(cursor: RingIndex) -> Self {
        Self { cursor }
    }

    /// Next index to read
    pub const fn cursor(&self) -> RingIndex {
        self.cursor
    }

    /// Move the cursor, e.g. after the ring head was reset
    pub fn reset(&mut self, cursor: RingIndex) {
        self.cursor = cursor;
    }

    /// Read the head and return a lazy iterator over `[cursor, head)`
    ///
    /// # Errors
    ///
    /// Returns error if the head request fails.
    pub fn drain_new_entries<'r, 'a, B: BridgeBackend>(
        &'r mut self,
        controller: &'r mut ConfigController<'a, B>,
    ) -> Result<RingDrain<'r, 'a, B>> {
        let head = controller.request_ring_head()?.wait()?;
        debug!(
            "Ring head {head}, cursor {}, {} new",
            self.cursor,
            self.cursor.distance_to(head)
        );
        Ok(RingDrain {
            reader: self,
            controller,
            head,
            failed: false,
        })
    }
}

/// Iterator over new ring entries
///
/// Each `next` issues one payload/timestamp request pair. After an error
/// the iterator ends and the cursor stays on the failed entry.
pub struct RingDrain<'r, 'a, B: BridgeBackend> {
    reader: &'r mut RingReader,
    controller: &'r mut ConfigController<'a, B>,
    head: RingIndex,
    failed: bool,
}

impl<B: BridgeBackend> std::fmt::Debug for RingDrain<'_, '_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingDrain")
            .field("cursor", &self.reader.cursor)
            .field("head", &self.head)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<B: BridgeBackend> RingDrain<'_, '_, B> {
    /// Head read at the start of the drain
    pub const fn head(&self) -> RingIndex {
        self.head
    }

    /// Entries not yet read
    pub fn remaining(&self) -> u16 {
        if self.failed {
            0
        } else {
            self.reader.cursor.distance_to(self.head)
        }
    }
}

impl<B: BridgeBackend> Iterator for RingDrain<'_, '_, B> {
    type Item = Result<RingEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.cursor == self.head {
            return None;
        }
        let index = self.reader.cursor;
        match self
            .controller
            .request_ring_entry(index)
            .and_then(PendingReply::wait)
        {
            Ok(reply) => {
                self.reader.cursor = index.next();
                Some(Ok(RingEntry {
                    index,
                    payload: reply.payload,
                    timestamp: reply.timestamp,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::from(self.remaining());
        (0, Some(n))
    }
}
