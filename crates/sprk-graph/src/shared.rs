//! Shared-object tables for both directions.
//!
//! Writing assigns each distinct object a dense index on first sight and
//! queues its body for the drain pass. Reading records where each body lives
//! and decodes it the first time its index is dereferenced.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};

use crate::codec::Primitive;
use crate::error::{GraphError, GraphResult};
use crate::savable::SavableRef;

/// Width of the entry count at the start of the shared block.
pub(crate) const COUNT_LEN: u64 = 4;
/// Width of the size prefix in front of each shared entry.
pub(crate) const SIZE_LEN: u64 = 8;

/// Write side: identity -> index, plus the queue of bodies still to drain.
#[derive(Default)]
pub(crate) struct SharedWriteTable {
    indices: HashMap<usize, u32>,
    queue: VecDeque<SavableRef>,
    /// Strong handles keep every assigned address alive, and therefore unique,
    /// until the table is reset.
    retained: Vec<SavableRef>,
}

impl SharedWriteTable {
    /// Index for `object`, assigning and queueing it on first sight.
    pub fn get_or_assign(&mut self, object: &SavableRef) -> u32 {
        let identity = object.identity();
        if let Some(&index) = self.indices.get(&identity) {
            return index;
        }
        let index = self.retained.len() as u32;
        self.indices.insert(identity, index);
        self.queue.push_back(object.clone());
        self.retained.push(object.clone());
        index
    }

    /// Next queued body, in index order.
    pub fn next_pending(&mut self) -> Option<SavableRef> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn reset(&mut self) {
        self.indices.clear();
        self.queue.clear();
        self.retained.clear();
    }
}

/// Per-entry decode state.
#[derive(Clone, Debug)]
pub(crate) enum SlotState {
    Unresolved,
    Resolved(SavableRef),
}

/// Where one shared body lives in the working stream.
#[derive(Clone, Debug)]
pub(crate) struct SharedEntry {
    pub offset: u64,
    pub size: u64,
    pub state: SlotState,
}

/// Read side: offsets captured at open, instances memoized on first use.
#[derive(Debug, Default)]
pub(crate) struct SharedReadTable {
    entries: Vec<SharedEntry>,
}

impl SharedReadTable {
    /// Walk the shared block's size prefixes without decoding any body.
    ///
    /// `input` must be positioned at `block_start`; on success it is left at
    /// the end of the shared block.
    pub fn parse<R: Read + Seek + ?Sized>(
        input: &mut R,
        block_start: u64,
        block_size: u64,
        max_entries: u32,
    ) -> GraphResult<Self> {
        let block_end = block_start
            .checked_add(block_size)
            .ok_or_else(|| GraphError::CorruptEntry {
                offset: block_start,
                reason: "shared block size overflows".into(),
            })?;
        if block_size < COUNT_LEN {
            return Err(GraphError::CorruptEntry {
                offset: block_start,
                reason: format!("shared block of {block_size} bytes cannot hold its count"),
            });
        }

        let count = u32::decode(input)?;
        if count > max_entries {
            return Err(GraphError::CorruptEntry {
                offset: block_start,
                reason: format!("{count} shared objects exceeds the limit of {max_entries}"),
            });
        }
        if u64::from(count) * SIZE_LEN > block_size - COUNT_LEN {
            return Err(GraphError::CorruptEntry {
                offset: block_start,
                reason: format!("{count} shared objects cannot fit in {block_size} bytes"),
            });
        }

        let mut entries = Vec::with_capacity(count as usize);
        for index in 0..count {
            let size = u64::decode(input)?;
            let offset = input.stream_position()?;
            let end = offset
                .checked_add(size)
                .filter(|end| *end <= block_end)
                .ok_or_else(|| GraphError::CorruptEntry {
                    offset,
                    reason: format!("shared entry {index} of {size} bytes overruns the shared block"),
                })?;
            if size < 4 {
                return Err(GraphError::CorruptEntry {
                    offset,
                    reason: format!("shared entry {index} is too small to hold a type key"),
                });
            }
            input.seek(SeekFrom::Start(end))?;
            entries.push(SharedEntry {
                offset,
                size,
                state: SlotState::Unresolved,
            });
        }

        let table_end = input.stream_position()?;
        if table_end != block_end {
            return Err(GraphError::CorruptEntry {
                offset: table_end,
                reason: format!("shared entries end at {table_end}, block ends at {block_end}"),
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[SharedEntry] {
        &self.entries
    }

    /// Bounds-checked access by wire index.
    pub fn entry(&self, index: i64) -> GraphResult<&SharedEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(GraphError::SharedIndexOutOfBounds {
                index,
                count: self.entries.len(),
            })
    }

    /// Transition an entry to `Resolved`.
    pub fn resolve(&mut self, index: usize, instance: SavableRef) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.state = SlotState::Resolved(instance);
        }
    }

    /// Return an entry to `Unresolved` after a failed decode.
    pub fn unresolve(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.state = SlotState::Unresolved;
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.state, SlotState::Resolved(_)))
            .count()
    }
}
