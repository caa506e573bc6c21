//! Lazy, thread-safe materialization of per-handle state.
//!
//! Every handle field that needs a read from the hive lives in a
//! [`LazySlot`]. Readers share a read lock on resolved state. The first
//! resolution takes the write lock, checks again whether another thread got
//! there first, and only then reads and decodes the cell.
//!
//! A slot lock is never held while another slot's lock is taken, so handles
//! navigated from different threads cannot deadlock on each other.

use crate::error::{RegistryError, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
enum SlotState<T> {
    Unresolved,
    Resolved(T),
    Corrupted(RegistryError),
}

/// A value resolved at most once, with sticky structural failures.
///
/// Structural corruption (see [`RegistryError::is_corruption`]) is cached
/// and returned again by later calls. Any other failure, such as an I/O
/// error, leaves the slot unresolved.
#[derive(Debug)]
pub struct LazySlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T: Clone> Clone for LazySlot<T> {
    fn clone(&self) -> Self {
        let state = match &*self.read() {
            SlotState::Unresolved => SlotState::Unresolved,
            SlotState::Resolved(value) => SlotState::Resolved(value.clone()),
            SlotState::Corrupted(err) => SlotState::Corrupted(err.clone()),
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

impl<T> Default for LazySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazySlot<T> {
    /// Creates an unresolved slot.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SlotState::Unresolved),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SlotState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> LazySlot<T> {
    /// Returns the cached outcome without resolving.
    pub fn peek(&self) -> Option<Result<T>> {
        match &*self.read() {
            SlotState::Unresolved => None,
            SlotState::Resolved(value) => Some(Ok(value.clone())),
            SlotState::Corrupted(err) => Some(Err(err.clone())),
        }
    }

    /// Returns true if resolution failed with structural corruption.
    pub fn is_corrupted(&self) -> bool {
        matches!(&*self.read(), SlotState::Corrupted(_))
    }

    /// Returns the value, running `resolve` if no thread has resolved it yet.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(outcome) = self.peek() {
            return outcome;
        }

        let mut state = self.write();
        match &*state {
            SlotState::Resolved(value) => return Ok(value.clone()),
            SlotState::Corrupted(err) => return Err(err.clone()),
            SlotState::Unresolved => {}
        }

        match resolve() {
            Ok(value) => {
                *state = SlotState::Resolved(value.clone());
                Ok(value)
            }
            Err(err) => {
                if err.is_corruption() {
                    *state = SlotState::Corrupted(err.clone());
                }
                Err(err)
            }
        }
    }
}
