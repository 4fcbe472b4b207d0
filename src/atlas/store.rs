//! Locked sub-store wrapper and its scoped write guard.
//!
//! Each of the map's four stores sits behind its own `parking_lot::RwLock`.
//! There is no map-wide lock. Code that needs several stores at once goes
//! through [`MapTransaction`](crate::atlas::MapTransaction), which acquires
//! in [`StoreKind::CANONICAL_ORDER`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{MapError, Result};

use super::identification::Identification;

/// The four lockable stores of a [`SparseMap`](crate::atlas::SparseMap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKind {
    PointCloud,
    Keyframes,
    CovisibilityGraph,
    KeyframeRetrieval,
}

impl StoreKind {
    /// Total lock order. Identification is always taken after all of these.
    pub const CANONICAL_ORDER: [StoreKind; 4] = [
        StoreKind::PointCloud,
        StoreKind::Keyframes,
        StoreKind::CovisibilityGraph,
        StoreKind::KeyframeRetrieval,
    ];

    pub fn rank(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            StoreKind::PointCloud => "point cloud",
            StoreKind::Keyframes => "keyframe collection",
            StoreKind::CovisibilityGraph => "covisibility graph",
            StoreKind::KeyframeRetrieval => "keyframe retrieval",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A store value behind its own reader-writer lock.
pub struct Store<T> {
    kind: StoreKind,
    inner: RwLock<T>,
}

impl<T> Store<T> {
    pub fn new(kind: StoreKind, value: T) -> Self {
        Self {
            kind,
            inner: RwLock::new(value),
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Block until exclusive access is available.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Exclusive access, giving up after `timeout`.
    pub fn try_write_for(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        self.inner
            .try_write_for(timeout)
            .ok_or(MapError::LockContentionTimeout {
                store: self.kind,
                waited: timeout,
            })
    }

    /// Shared access; any number of readers may hold it at once.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read()
    }

    /// Lock-free access. Exclusive borrow of the store proves no guard is out.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Swap the whole value under the write lock, waiting for outstanding guards.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.inner.write(), value)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.kind)
            .field("inner", &self.inner)
            .finish()
    }
}

/// Scoped exclusive handle on one store.
///
/// Released on drop on every exit path. Mutable access through the guard
/// marks it modified, and dropping a modified guard advances the owning
/// map's last update time.
pub struct StoreGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    identification: &'a Mutex<Identification>,
    modified: bool,
}

impl<'a, T> StoreGuard<'a, T> {
    pub(crate) fn new(
        guard: RwLockWriteGuard<'a, T>,
        identification: &'a Mutex<Identification>,
    ) -> Self {
        Self {
            guard,
            identification,
            modified: false,
        }
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

impl<T> Deref for StoreGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for StoreGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.modified = true;
        &mut self.guard
    }
}

impl<T> Drop for StoreGuard<'_, T> {
    fn drop(&mut self) {
        // identification ranks after every store, so taking it here keeps the order
        if self.modified {
            self.identification.lock().touch();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StoreGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGuard")
            .field("value", &*self.guard)
            .field("modified", &self.modified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_rank() {
        for (i, kind) in StoreKind::CANONICAL_ORDER.iter().enumerate() {
            assert_eq!(kind.rank(), i);
        }
    }

    #[test]
    fn test_try_write_times_out() {
        let store = Store::new(StoreKind::Keyframes, 0u32);
        let _held = store.write();

        let err = store.try_write_for(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            MapError::LockContentionTimeout {
                store: StoreKind::Keyframes,
                ..
            }
        ));
    }

    #[test]
    fn test_replace_returns_previous() {
        let store = Store::new(StoreKind::PointCloud, vec![1, 2]);
        let old = store.replace(vec![3]);
        assert_eq!(old, vec![1, 2]);
        assert_eq!(*store.read(), vec![3]);
    }

    #[test]
    fn test_guard_touches_identification_only_when_written() {
        let store = Store::new(StoreKind::PointCloud, 0u32);
        let ident = Mutex::new(Identification::new());
        let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        ident.lock().set_created_time(epoch);
        ident.lock().set_last_update_time(epoch);

        {
            let guard = StoreGuard::new(store.write(), &ident);
            assert_eq!(*guard, 0);
            assert!(!guard.is_modified());
        }
        assert_eq!(*ident.lock().last_update_time(), epoch);

        {
            let mut guard = StoreGuard::new(store.write(), &ident);
            *guard += 1;
            assert!(guard.is_modified());
        }
        assert!(*ident.lock().last_update_time() > epoch);
        assert_eq!(*store.read(), 1);
    }
}
