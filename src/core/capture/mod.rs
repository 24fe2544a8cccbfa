//! Capture buffers and the buffer lock manager
//!
//! Captured output lives in two round-robin rings, one for interpreted
//! text and one for the raw received byte stream. A [`CaptureHandle`] is the
//! shareable handle to a ring; the idle loop locks the rings for exactly one
//! dispatch cycle through a [`CaptureScope`]. Locking never waits: a handle
//! that is missing or already locked elsewhere simply means "no buffer this
//! cycle".

pub mod dispatch;
mod ring;

pub use dispatch::{CaptureError, DispatchReport, LogSink, NoPublish, NullSink, PublishChannel};
pub use ring::{CaptureReader, CaptureRing};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Capture buffer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// Interpreted terminal text
    Text,
    /// Raw received bytes
    Binary,
}

impl CaptureKind {
    /// Both kinds, in dispatch order
    pub const ALL: [CaptureKind; 2] = [CaptureKind::Text, CaptureKind::Binary];
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Shareable handle to a capture ring
#[derive(Clone)]
pub struct CaptureHandle {
    inner: Arc<Mutex<CaptureRing>>,
}

impl CaptureHandle {
    /// Allocate a ring of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureRing::new(capacity))),
        }
    }

    /// Whether some scope currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Inspect the ring outside a dispatch cycle. Returns `None` while it is locked.
    pub fn inspect<R>(&self, f: impl FnOnce(&CaptureRing) -> R) -> Option<R> {
        self.inner.try_lock().map(|ring| f(&ring))
    }

    fn try_lock(&self) -> Option<CaptureLock> {
        self.inner.try_lock_arc().map(|guard| CaptureLock { guard })
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// The text and binary capture handles of one session
#[derive(Debug, Clone, Default)]
pub struct CaptureHandles {
    /// Text capture, if allocated
    pub text: Option<CaptureHandle>,
    /// Binary capture, if allocated
    pub binary: Option<CaptureHandle>,
}

impl CaptureHandles {
    /// Allocate both rings
    pub fn allocate(text_capacity: usize, binary_capacity: usize) -> Self {
        Self {
            text: Some(CaptureHandle::new(text_capacity)),
            binary: Some(CaptureHandle::new(binary_capacity)),
        }
    }

    /// Handle for `kind`
    pub fn get(&self, kind: CaptureKind) -> Option<&CaptureHandle> {
        match kind {
            CaptureKind::Text => self.text.as_ref(),
            CaptureKind::Binary => self.binary.as_ref(),
        }
    }
}

/// A held capture lock. Unlocks when dropped.
pub struct CaptureLock {
    guard: ArcMutexGuard<RawMutex, CaptureRing>,
}

impl Deref for CaptureLock {
    type Target = CaptureRing;

    fn deref(&self) -> &CaptureRing {
        &self.guard
    }
}

impl DerefMut for CaptureLock {
    fn deref_mut(&mut self) -> &mut CaptureRing {
        &mut self.guard
    }
}

/// Capture locks held for the duration of one dispatch cycle.
///
/// Every lock still held when the scope is dropped is released, so a cycle
/// that leaves early cannot carry a lock into the next idle invocation.
#[derive(Default)]
pub struct CaptureScope {
    text: Option<CaptureLock>,
    binary: Option<CaptureLock>,
}

impl CaptureScope {
    /// Empty scope holding nothing
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: CaptureKind) -> &mut Option<CaptureLock> {
        match kind {
            CaptureKind::Text => &mut self.text,
            CaptureKind::Binary => &mut self.binary,
        }
    }

    /// Lock the `kind` ring if a handle exists and it is not held yet.
    ///
    /// Acquiring an already held kind returns the held ring unchanged.
    pub fn acquire(
        &mut self,
        kind: CaptureKind,
        handles: &CaptureHandles,
    ) -> Option<&mut CaptureRing> {
        let slot = self.slot(kind);
        if slot.is_none() {
            let Some(handle) = handles.get(kind) else {
                return None;
            };
            match handle.try_lock() {
                Some(mut lock) => {
                    lock.note_locked();
                    tracing::trace!(%kind, "capture locked");
                    *slot = Some(lock);
                }
                None => {
                    tracing::trace!(%kind, "capture busy, skipped this cycle");
                    return None;
                }
            }
        }
        slot.as_mut().map(|lock| &mut **lock)
    }

    /// The held `kind` ring, if any
    pub fn get_mut(&mut self, kind: CaptureKind) -> Option<&mut CaptureRing> {
        self.slot(kind).as_mut().map(|lock| &mut **lock)
    }

    /// Whether `kind` is currently held
    pub fn is_held(&self, kind: CaptureKind) -> bool {
        match kind {
            CaptureKind::Text => self.text.is_some(),
            CaptureKind::Binary => self.binary.is_some(),
        }
    }

    /// Unlock `kind`. Returns whether a lock was held.
    pub fn release(&mut self, kind: CaptureKind) -> bool {
        let released = self.slot(kind).take().is_some();
        if released {
            tracing::trace!(%kind, "capture released");
        }
        released
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        for kind in CaptureKind::ALL {
            self.release(kind);
        }
    }
}
