//! # Delta Chain Records
//!
//! Every mapping-table slot points at the head of a delta chain: a linked
//! sequence of immutable records ending in a base page. The record kinds and
//! their traversal semantics:
//!
//! | Kind | Traversal behavior |
//! |------|--------------------|
//! | `Inner` (base) | resolve the child by binary search over separators |
//! | `Leaf` (base) | answer reads from the sorted entry list |
//! | `IndexTerm` | if the key falls in `(low, high]`, descend to `child`; else next |
//! | `Split` | if the key is greater than `split_key`, redirect to `sibling`; else next |
//! | `RemoveNode` | page is merging into its left sibling; readers follow `left` |
//! | `NodeMerge` | keys above `merge_key` are served from the merged entries; else next |
//! | `Modify` | authoritative value list for exactly `key`; empty means deleted |
//!
//! ## Immutability & Publication
//!
//! A record's `next` pointer is set at allocation, before the record is
//! published by CAS on the owning mapping-table slot. Once published a
//! record is never written again; superseded records are handed to the
//! epoch reclaimer.
//!
//! ## Bounds
//!
//! Key ranges are half-open on the low side: a page with bounds
//! `(low, high]` owns keys strictly greater than `low` up to and including
//! `high`. A `None` bound is the absolute-min/absolute-max flag: the page
//! is unbounded on that side.

use smallvec::SmallVec;

/// Page identifier: a slot in the mapping table.
pub type Pid = u64;

pub const ROOT_PID: Pid = 0;

/// Values held under one key. Most keys carry a single value.
pub(crate) type ValueList<V> = SmallVec<[V; 1]>;

pub(crate) struct PageNode<K, V> {
    /// Next record toward the base page; null for base pages.
    pub(crate) next: *mut PageNode<K, V>,
    pub(crate) record: Record<K, V>,
}

impl<K, V> PageNode<K, V> {
    /// Allocates a record with its chain link already set, ready for CAS
    /// publication.
    pub(crate) fn alloc(record: Record<K, V>, next: *mut PageNode<K, V>) -> *mut PageNode<K, V> {
        Box::into_raw(Box::new(PageNode { next, record }))
    }
}

pub(crate) enum Record<K, V> {
    Inner(InnerNode<K>),
    Leaf(LeafNode<K, V>),
    IndexTerm(IndexTermDelta<K>),
    Split(SplitDelta<K>),
    RemoveNode(RemoveNodeDelta),
    NodeMerge(NodeMergeDelta<K, V>),
    Modify(ModifyDelta<K, V>),
}

/// Base inner page. `entries` pairs an upper-bound separator with the child
/// owning `(previous separator, separator]`; a `None` separator is the
/// absolute-max child and may only appear last.
pub(crate) struct InnerNode<K> {
    pub(crate) entries: Vec<(Option<K>, Pid)>,
    pub(crate) low_key: Option<K>,
    pub(crate) high_key: Option<K>,
}

impl<K> InnerNode<K> {
    pub(crate) fn empty() -> Self {
        Self {
            entries: Vec::new(),
            low_key: None,
            high_key: None,
        }
    }
}

/// Base leaf page: sorted `(key, values)` entries plus the right-sibling
/// link range scans follow.
pub(crate) struct LeafNode<K, V> {
    pub(crate) entries: Vec<(K, ValueList<V>)>,
    pub(crate) low_key: Option<K>,
    pub(crate) high_key: Option<K>,
    pub(crate) right_link: Option<Pid>,
}

/// Routes keys in `(low, high]` to `child`. Prepending one of these to the
/// parent is the second half of a split and the third step of a merge.
pub(crate) struct IndexTermDelta<K> {
    pub(crate) low: Option<K>,
    pub(crate) high: Option<K>,
    pub(crate) child: Pid,
}

/// First half of a split: keys above `split_key` now live at `sibling`.
/// Readers observe the split through this record before the parent learns
/// about the sibling.
pub(crate) struct SplitDelta<K> {
    pub(crate) split_key: K,
    pub(crate) sibling: Pid,
}

/// The page is being merged away; readers follow `left` to the surviving
/// sibling. The removed page's former content hangs off `next` until the
/// merge completes.
pub(crate) struct RemoveNodeDelta {
    pub(crate) left: Pid,
}

/// Published on the surviving left sibling: keys above `merge_key` are
/// served from `entries` (the removed page's content, owned outright so the
/// record stays self-contained and immutable).
pub(crate) struct NodeMergeDelta<K, V> {
    pub(crate) merge_key: K,
    pub(crate) entries: Vec<(K, ValueList<V>)>,
    pub(crate) right_link: Option<Pid>,
    pub(crate) high_key: Option<K>,
}

/// Authoritative value list for `key` at this point in the chain. An empty
/// list is a deletion.
pub(crate) struct ModifyDelta<K, V> {
    pub(crate) key: K,
    pub(crate) values: ValueList<V>,
}
