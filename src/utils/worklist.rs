//! LIFO worklist with duplicate suppression.
//!
//! The fixpoint passes (phi liveness, phi specialization, float32
//! classification) all share the same shape: pop an id, maybe push some
//! neighbours, and never hold the same id twice. The in-worklist set
//! replaces the per-node "in worklist" flag.

use std::fmt;

use crate::{
    utils::{EntityId, IdSet},
    Result,
};

/// A stack of ids where each id is present at most once.
#[derive(Clone)]
pub struct Worklist<I> {
    stack: Vec<I>,
    queued: IdSet<I>,
}

impl<I: EntityId> Worklist<I> {
    /// Creates an empty worklist sized for ids below `capacity`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            queued: IdSet::with_capacity(capacity),
        }
    }

    /// Pushes `id` unless it is already queued.
    ///
    /// Returns `true` if the id was added.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfMemory`] if the worklist cannot grow.
    pub fn push(&mut self, id: I) -> Result<bool> {
        if self.queued.contains(id) {
            return Ok(false);
        }
        self.stack.try_reserve(1)?;
        self.queued.insert(id)?;
        self.stack.push(id);
        Ok(true)
    }

    /// Pops the most recently pushed id.
    pub fn pop(&mut self) -> Option<I> {
        let id = self.stack.pop()?;
        self.queued.remove(id);
        Some(id)
    }

    /// Returns `true` if `id` is currently queued.
    #[must_use]
    pub fn contains(&self, id: I) -> bool {
        self.queued.contains(id)
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Returns the number of queued ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Drops every queued id.
    pub fn clear(&mut self) {
        self.stack.clear();
        self.queued.clear();
    }
}

impl<I: EntityId> Default for Worklist<I> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<I: EntityId + fmt::Debug> fmt::Debug for Worklist<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stack.iter()).finish()
    }
}
