//! Small collections shared by the IR and the passes.
//!
//! - [`IdSet`] - a growable bit vector keyed by typed arena ids
//! - [`Worklist`] - a LIFO worklist with an in-worklist set

mod bitset;
mod worklist;

pub use bitset::IdSet;
pub use worklist::Worklist;

/// A dense arena index with a typed wrapper.
///
/// Implemented by [`BlockId`](crate::mir::BlockId),
/// [`ValueId`](crate::mir::ValueId) and [`SnapshotId`](crate::mir::SnapshotId)
/// so that sets and worklists can be keyed by any of them.
pub trait EntityId: Copy + Eq {
    /// Wraps a raw arena index.
    fn new(index: usize) -> Self;

    /// Returns the raw arena index.
    fn index(self) -> usize;
}
