// SPDX-License-Identifier: Apache-2.0

//! Transaction capture buffer
//!
//! Append log owned by a single tracked transaction. Entries leave the
//! buffer exactly once, through `drain`, or are discarded by `reset`.

use std::mem;

use parking_lot::Mutex;

/// Ordered, lock-protected log of captured entries
#[derive(Debug)]
pub struct CaptureBuffer<T> {
    entries: Mutex<Vec<T>>,
}

impl<T> Default for CaptureBuffer<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> CaptureBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    /// Takes every entry in insertion order, leaving the buffer empty
    pub fn drain(&self) -> Vec<T> {
        mem::take(&mut *self.entries.lock())
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
