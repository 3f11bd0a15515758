//! A growable bit vector keyed by typed ids.
//!
//! Passes allocate new values while they run (conversions, optimized-out
//! constants), so unlike a fixed-capacity bit vector an [`IdSet`] grows on
//! insertion and treats ids beyond its current capacity as absent.
//!
//! # Example
//!
//! ```rust
//! use mirflow::utils::IdSet;
//! use mirflow::mir::ValueId;
//!
//! let mut set: IdSet<ValueId> = IdSet::with_capacity(16);
//! set.insert(ValueId::new(3))?;
//! set.insert(ValueId::new(200))?;
//!
//! assert!(set.contains(ValueId::new(200)));
//! assert!(!set.contains(ValueId::new(4)));
//! assert_eq!(set.count(), 2);
//! # Ok::<(), mirflow::Error>(())
//! ```

use std::{fmt, marker::PhantomData};

use crate::{utils::EntityId, Result};

/// A set of arena ids stored as one bit per id.
#[derive(Clone, PartialEq, Eq)]
pub struct IdSet<I> {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    _marker: PhantomData<I>,
}

impl<I: EntityId> IdSet<I> {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Creates an empty set with room for ids below `capacity`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            _marker: PhantomData,
        }
    }

    /// Returns `true` if no id is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds `id` to the set, growing it as needed.
    ///
    /// Returns `true` if the id was not present before.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfMemory`] if the set cannot grow.
    pub fn insert(&mut self, id: I) -> Result<bool> {
        let (word, mask) = Self::locate(id);
        if word >= self.words.len() {
            let missing = word + 1 - self.words.len();
            self.words.try_reserve(missing)?;
            self.words.resize(word + 1, 0);
        }
        let slot = &mut self.words[word];
        let fresh = *slot & mask == 0;
        *slot |= mask;
        Ok(fresh)
    }

    /// Removes `id` from the set. Returns `true` if it was present.
    pub fn remove(&mut self, id: I) -> bool {
        let (word, mask) = Self::locate(id);
        match self.words.get_mut(word) {
            Some(slot) => {
                let present = *slot & mask != 0;
                *slot &= !mask;
                present
            }
            None => false,
        }
    }

    /// Returns `true` if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: I) -> bool {
        let (word, mask) = Self::locate(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Returns the number of ids in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every id, keeping the allocation.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Returns an iterator over the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = I> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(I::new(word_idx * 64 + bit))
            })
        })
    }

    #[inline]
    fn locate(id: I) -> (usize, u64) {
        let index = id.index();
        (index / 64, 1u64 << (index % 64))
    }
}

impl<I: EntityId> Default for IdSet<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: EntityId + fmt::Debug> fmt::Debug for IdSet<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::ValueId;

    fn v(index: usize) -> ValueId {
        ValueId::new(index)
    }

    #[test]
    fn test_insert_reports_freshness() {
        let mut set = IdSet::with_capacity(8);
        assert!(set.insert(v(5)).unwrap());
        assert!(!set.insert(v(5)).unwrap());
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut set = IdSet::with_capacity(4);
        set.insert(v(1000)).unwrap();
        assert!(set.contains(v(1000)));
        assert!(!set.contains(v(999)));
        assert!(!set.contains(v(100_000)));
    }

    #[test]
    fn test_remove() {
        let mut set = IdSet::new();
        set.insert(v(64)).unwrap();
        assert!(set.remove(v(64)));
        assert!(!set.remove(v(64)));
        assert!(!set.remove(v(4096)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_iter_ascending_across_words() {
        let mut set = IdSet::new();
        for i in [130, 0, 63, 64] {
            set.insert(v(i)).unwrap();
        }
        let ids: Vec<usize> = set.iter().map(ValueId::index).collect();
        assert_eq!(ids, vec![0, 63, 64, 130]);
    }

    #[test]
    fn test_clear() {
        let mut set = IdSet::new();
        set.insert(v(7)).unwrap();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.count(), 0);
    }
}
