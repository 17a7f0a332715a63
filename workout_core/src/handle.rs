//! Shared handle to one session store.
//!
//! Several consumers (set editor, rest countdown, summary screen) need the
//! same store. The application builds the store once at startup and hands
//! out clones of a `SessionHandle`; each call locks the store for its whole
//! duration, so mutations never interleave.

use crate::storage::SessionStorage;
use crate::store::SessionStore;
use crate::Session;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct SessionHandle<S: SessionStorage> {
    inner: Arc<Mutex<SessionStore<S>>>,
}

impl<S: SessionStorage> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SessionStorage> SessionHandle<S> {
    pub fn new(store: SessionStore<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionStore<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read against the store
    pub fn read<R>(&self, f: impl FnOnce(&SessionStore<S>) -> R) -> R {
        f(&self.lock())
    }

    /// Run one or more mutations as a single step
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionStore<S>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> Session {
        self.read(|store| store.snapshot())
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.read(|store| store.elapsed_seconds())
    }

    pub fn rest_remaining(&self, exercise_id: &str) -> u32 {
        self.read(|store| store.rest_remaining(exercise_id))
    }
}
