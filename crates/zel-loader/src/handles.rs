//! Loader-issued handles standing in for driver-native ones.
//!
//! A wrapped handle has bit 63 set, its [`HandleKind`] in bits 56..62 and a sequence number
//! below. Driver-native handles issued under the DDI handle extension keep bit 63 clear, so the
//! two never collide.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use zel_api::{HandleKind, ZeResult};
use zel_ddi::{HANDLE_PAYLOAD_MASK, HANDLE_TAG_SHIFT};

pub const WRAPPED_BIT: u64 = 1 << 63;

/// What a wrapped handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrappedHandle {
    /// Registry index of the owning driver.
    pub driver: usize,
    pub kind: HandleKind,
    pub native: u64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    #[error("unknown handle {0:#x}")]
    Unknown(u64),
    #[error("handle {handle:#x} is a {actual:?} handle, expected {expected:?}")]
    KindMismatch {
        handle: u64,
        expected: HandleKind,
        actual: HandleKind,
    },
}

impl From<HandleError> for ZeResult {
    fn from(_: HandleError) -> Self {
        ZeResult::ErrorInvalidNullHandle
    }
}

pub fn is_wrapped(handle: u64) -> bool {
    handle & WRAPPED_BIT != 0
}

/// Kind encoded in a wrapped handle.
pub fn wrapped_kind(handle: u64) -> Option<HandleKind> {
    if !is_wrapped(handle) {
        return None;
    }
    HandleKind::from_u8(((handle >> HANDLE_TAG_SHIFT) & 0x7f) as u8)
}

#[derive(Default)]
pub struct HandleTable {
    next: AtomicU64,
    entries: DashMap<u64, WrappedHandle>,
    reverse: DashMap<WrappedHandle, u64>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapper of `native`, creating it on first sight. Null stays null.
    pub fn wrap(&self, driver: usize, kind: HandleKind, native: u64) -> u64 {
        if native == 0 {
            return 0;
        }
        let target = WrappedHandle {
            driver,
            kind,
            native,
        };
        *self.reverse.entry(target).or_insert_with(|| {
            let sequence = self.next.fetch_add(1, Ordering::Relaxed) + 1;
            let handle = WRAPPED_BIT
                | (u64::from(kind as u8) << HANDLE_TAG_SHIFT)
                | (sequence & HANDLE_PAYLOAD_MASK);
            self.entries.insert(handle, target);
            handle
        })
    }

    pub fn get(&self, handle: u64) -> Option<WrappedHandle> {
        self.entries.get(&handle).map(|entry| *entry)
    }

    /// Registry index of the driver behind a wrapped handle.
    pub fn owner_of(&self, handle: u64) -> Option<usize> {
        self.entries.get(&handle).map(|entry| entry.driver)
    }

    /// Native handle behind `handle`, checked against the expected kind.
    pub fn translate(&self, kind: HandleKind, handle: u64) -> Result<u64, HandleError> {
        if handle == 0 {
            return Ok(0);
        }
        let entry = self.get(handle).ok_or(HandleError::Unknown(handle))?;
        if entry.kind != kind {
            return Err(HandleError::KindMismatch {
                handle,
                expected: kind,
                actual: entry.kind,
            });
        }
        Ok(entry.native)
    }

    /// Drops the wrapper of a destroyed object. Returns whether one existed.
    pub fn release(&self, kind: HandleKind, handle: u64) -> bool {
        match self.entries.remove_if(&handle, |_, entry| entry.kind == kind) {
            Some((_, entry)) => {
                self.reverse.remove(&entry);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
