//! The external integer store and fault-tolerant access to it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::ReadFault;

/// Read access to the sparse external integer table.
///
/// Implementations absorb whatever unsafe access the host needs and hand
/// back a typed result; callers never see a raw fault.
pub trait IntStore {
    fn read(&mut self, index: i32) -> Result<i32, ReadFault>;
}

impl<T: IntStore + ?Sized> IntStore for &mut T {
    fn read(&mut self, index: i32) -> Result<i32, ReadFault> {
        (**self).read(index)
    }
}

/// In-memory store, used for replays and tests.
///
/// Indices in `faults` raise [`ReadFault::Fault`]; indices with no value
/// are [`ReadFault::Missing`].
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    values: HashMap<i32, i32>,
    faults: HashSet<i32>,
    #[serde(skip)]
    reads: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON dump of the form `{ "values": { "<index>": <int> } }`.
    /// An optional `"faults": [<index>, ...]` list marks faulting indices.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read store dump {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store dump {}", path.display()))
    }

    pub fn set(&mut self, index: i32, value: i32) {
        self.values.insert(index, value);
    }

    pub fn remove(&mut self, index: i32) {
        self.values.remove(&index);
    }

    pub fn set_fault(&mut self, index: i32, faulting: bool) {
        if faulting {
            self.faults.insert(index);
        } else {
            self.faults.remove(&index);
        }
    }

    /// Total reads served, faults included.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntStore for MemoryStore {
    fn read(&mut self, index: i32) -> Result<i32, ReadFault> {
        self.reads += 1;
        if self.faults.contains(&index) {
            return Err(ReadFault::Fault(index));
        }
        self.values.get(&index).copied().ok_or(ReadFault::Missing(index))
    }
}

/// Rate limit for read-fault log lines: the first fault is logged, then
/// at most one line per cooldown.
#[derive(Debug, Default, Clone)]
pub struct FaultLog {
    seen: bool,
    next_log_at_ms: u64,
    suppressed: u32,
}

impl FaultLog {
    /// Records a fault. Returns true if a line was written.
    pub fn note(&mut self, fault: &ReadFault, context: &str, now_ms: u64, cooldown_ms: u64) -> bool {
        if self.seen && now_ms < self.next_log_at_ms {
            self.suppressed += 1;
            return false;
        }
        if self.suppressed > 0 {
            log::warn!(
                "[MONEY] {} during {} ({} more suppressed)",
                fault,
                context,
                self.suppressed
            );
        } else {
            log::warn!("[MONEY] {} during {}", fault, context);
        }
        self.seen = true;
        self.suppressed = 0;
        self.next_log_at_ms = now_ms + cooldown_ms;
        true
    }
}
