//! # BW-Tree: Lock-Free Ordered Index
//!
//! A concurrent ordered map from keys to value sets, built on a mapping
//! table of atomically swapped delta-chain heads. No operation takes a
//! lock: readers walk immutable chains, writers prepend records with CAS,
//! and structural changes are published as multi-step delta sequences that
//! stay correct at every intermediate state.
//!
//! ## Mapping Table
//!
//! ```text
//! PID ──> AtomicPtr ──> [delta] -> [delta] -> ... -> [base page]
//! ```
//!
//! The slot for a PID is only ever updated by compare-and-swap from the
//! previously observed head. A failed CAS means another thread won the
//! race; the operation rebuilds its record and retries from the root. PIDs
//! are allocated monotonically and never change role between inner and
//! leaf.
//!
//! ## Traversal
//!
//! Starting at the root, each record either answers in place, redirects to
//! another PID (child descent, split sibling, merge survivor), or falls
//! through to the next link. A chain that ends without a base node, or a
//! base page with unsorted keys, is reported as corruption.
//!
//! ## Mutation
//!
//! Insert and delete compute the authoritative post-image of the key's
//! value list from the current chain, wrap it in a `Modify` record whose
//! `next` is the observed head, and publish with CAS. The first insert
//! into an empty tree installs a fresh leaf plus an absolute-range
//! `IndexTerm` over the empty root (losing that race discards both and
//! retries).
//!
//! ## Structural Modification
//!
//! Writers that grow a chain past `DELTA_CHAIN_THRESHOLD` consolidate it
//! into a fresh base page. A consolidated leaf that is too large splits:
//! sibling page first, `Split` record on the original, `IndexTerm` on the
//! parent — readers see the split through the `Split` record before the
//! parent does. A consolidated leaf left empty merges into its left
//! sibling: `RemoveNode` on the dying page, `NodeMerge` on the survivor,
//! widened `IndexTerm` on the parent. Every step is individually
//! publishable; readers may observe any prefix of the sequence.
//!
//! ## Memory Ordering & Reclamation
//!
//! Heads are loaded with acquire and published with release, so a reader
//! that sees a record also sees everything it links to. Superseded records
//! are retired to the epoch manager and freed only after every pinned
//! traversal of that era has finished (see [`epoch`](super::epoch)).

use super::delta::{
    IndexTermDelta, InnerNode, LeafNode, ModifyDelta, NodeMergeDelta, PageNode, Pid, Record,
    RemoveNodeDelta, SplitDelta, ValueList, ROOT_PID,
};
use super::epoch::EpochManager;
use super::scan::{RangeScan, ScanBounds};
use crate::config::{
    CAS_RETRY_LIMIT, DELTA_CHAIN_THRESHOLD, LEAF_MAX_ENTRIES, MAPPING_TABLE_CAPACITY,
    MAX_TRAVERSAL_STEPS,
};
use eyre::{bail, Result};
use std::cmp::Ordering;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering as AtomicOrdering};
use tracing::trace;

/// Fatal error: a delta chain or base page violated a structural
/// invariant. Unlike CAS contention this is never retried.
#[derive(Debug)]
pub struct IndexCorruption(pub String);

impl fmt::Display for IndexCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index corruption: {}", self.0)
    }
}

impl std::error::Error for IndexCorruption {}

pub(crate) fn corruption<T>(detail: String) -> Result<T> {
    Err(eyre::Report::new(IndexCorruption(detail)))
}

/// Total order over keys, supplied at construction.
pub trait KeyComparator<K>: Send + Sync {
    fn cmp(&self, a: &K, b: &K) -> Ordering;
}

/// Key equality, supplied at construction. Kept separate from the
/// comparator so equality can be cheaper than a full three-way compare.
pub trait KeyEquality<K>: Send + Sync {
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Comparator delegating to the key's own `Ord`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn cmp(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Equality delegating to the key's own `PartialEq`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdEquality;

impl<K: PartialEq> KeyEquality<K> for OrdEquality {
    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Where a key lives right now: either the tree is still the empty
/// bootstrap root, or a leaf chain plus the authoritative value list
/// assembled while walking it.
enum Located<K, V> {
    EmptyRoot {
        head: *mut PageNode<K, V>,
    },
    Leaf {
        pid: Pid,
        parent: Pid,
        head: *mut PageNode<K, V>,
        values: ValueList<V>,
    },
}

/// A routing range owned by one child: keys in `(low, high]`, with `None`
/// meaning unbounded on that side.
#[derive(Clone)]
pub(crate) struct Claim<K> {
    pub(crate) low: Option<K>,
    pub(crate) high: Option<K>,
    pub(crate) child: Pid,
}

pub(crate) struct InnerView<K> {
    pub(crate) claims: Vec<Claim<K>>,
}

/// Flattened view of a leaf chain.
pub(crate) struct LeafView<K, V> {
    pub(crate) entries: Vec<(K, ValueList<V>)>,
    pub(crate) low_key: Option<K>,
    pub(crate) high_key: Option<K>,
    pub(crate) right_link: Option<Pid>,
    pub(crate) removed: bool,
}

pub struct BwTree<K, V, C = OrdComparator, E = OrdEquality> {
    slots: Box<[AtomicPtr<PageNode<K, V>>]>,
    pid_counter: AtomicU64,
    allow_duplicates: bool,
    comparator: C,
    key_eq: E,
    epoch: EpochManager<K, V>,
}

unsafe impl<K: Send + Sync, V: Send + Sync, C: Send, E: Send> Send for BwTree<K, V, C, E> {}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Sync, E: Sync> Sync for BwTree<K, V, C, E> {}

impl<K, V> BwTree<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    /// Tree over keys with a natural order.
    pub fn ordered(allow_duplicates: bool) -> Self {
        Self::new(OrdComparator, OrdEquality, allow_duplicates)
    }
}

impl<K, V, C, E> BwTree<K, V, C, E>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
    E: KeyEquality<K>,
{
    pub fn new(comparator: C, key_eq: E, allow_duplicates: bool) -> Self {
        let slots: Vec<AtomicPtr<PageNode<K, V>>> = (0..MAPPING_TABLE_CAPACITY)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        let slots = slots.into_boxed_slice();
        let root = PageNode::alloc(Record::Inner(InnerNode::empty()), ptr::null_mut());
        slots[ROOT_PID as usize].store(root, AtomicOrdering::Release);
        Self {
            slots,
            pid_counter: AtomicU64::new(ROOT_PID + 1),
            allow_duplicates,
            comparator,
            key_eq,
            epoch: EpochManager::new(),
        }
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    pub(crate) fn key_cmp(&self, a: &K, b: &K) -> Ordering {
        self.comparator.cmp(a, b)
    }

    /// Inserts the pair. Returns true if the pair is now present: false
    /// only when duplicates are disallowed and the key already carries a
    /// value; re-inserting an identical pair under duplicates reports
    /// success without change.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let _guard = self.epoch.pin()?;
        for _ in 0..CAS_RETRY_LIMIT {
            match self.locate(key)? {
                Located::EmptyRoot { head } => {
                    if let Some(done) = self.bootstrap_root(key, value, head)? {
                        return Ok(done);
                    }
                }
                Located::Leaf {
                    pid,
                    parent,
                    head,
                    values,
                } => {
                    if !self.allow_duplicates && !values.is_empty() {
                        return Ok(false);
                    }
                    if values.iter().any(|v| v == value) {
                        return Ok(true);
                    }
                    let mut updated = values;
                    updated.push(value.clone());
                    let delta = PageNode::alloc(
                        Record::Modify(ModifyDelta {
                            key: key.clone(),
                            values: updated,
                        }),
                        head,
                    );
                    if self.publish(pid, head, delta) {
                        self.finish_write(pid, parent)?;
                        return Ok(true);
                    }
                    // Never published: free immediately.
                    unsafe { drop(Box::from_raw(delta)) };
                }
            }
        }
        bail!(
            "resource exhaustion: insert gave up after {} CAS retries",
            CAS_RETRY_LIMIT
        )
    }

    /// Removes exactly this pair; true if it was present.
    pub fn delete(&self, key: &K, value: &V) -> Result<bool> {
        let _guard = self.epoch.pin()?;
        for _ in 0..CAS_RETRY_LIMIT {
            match self.locate(key)? {
                Located::EmptyRoot { .. } => return Ok(false),
                Located::Leaf {
                    pid,
                    parent,
                    head,
                    values,
                } => {
                    let Some(pos) = values.iter().position(|v| v == value) else {
                        return Ok(false);
                    };
                    let mut updated = values;
                    updated.remove(pos);
                    let delta = PageNode::alloc(
                        Record::Modify(ModifyDelta {
                            key: key.clone(),
                            values: updated,
                        }),
                        head,
                    );
                    if self.publish(pid, head, delta) {
                        self.finish_write(pid, parent)?;
                        return Ok(true);
                    }
                    unsafe { drop(Box::from_raw(delta)) };
                }
            }
        }
        bail!(
            "resource exhaustion: delete gave up after {} CAS retries",
            CAS_RETRY_LIMIT
        )
    }

    /// Current value set for the key; empty if absent.
    pub fn search(&self, key: &K) -> Result<Vec<V>> {
        let _guard = self.epoch.pin()?;
        match self.locate(key)? {
            Located::EmptyRoot { .. } => Ok(Vec::new()),
            Located::Leaf { values, .. } => Ok(values.into_vec()),
        }
    }

    /// Lazy ordered scan over `(key, value)` pairs. Restart by calling
    /// again.
    pub fn range_scan(&self, bounds: ScanBounds<K>) -> Result<RangeScan<'_, K, V, C, E>> {
        let guard = self.epoch.pin()?;
        let start = match &bounds.low {
            Some(key) => match self.locate(key)? {
                Located::EmptyRoot { .. } => None,
                Located::Leaf { pid, .. } => Some(pid),
            },
            None => self.leftmost_leaf()?,
        };
        Ok(RangeScan::new(self, guard, bounds, start))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    fn load_head(&self, pid: Pid) -> Result<*mut PageNode<K, V>> {
        let head = self.slots[pid as usize].load(AtomicOrdering::Acquire);
        if head.is_null() {
            return corruption(format!("mapping table slot {} is empty", pid));
        }
        Ok(head)
    }

    pub(crate) fn load_head_for_scan(&self, pid: Pid) -> Result<*mut PageNode<K, V>> {
        self.load_head(pid)
    }

    fn publish(
        &self,
        pid: Pid,
        expected: *mut PageNode<K, V>,
        new: *mut PageNode<K, V>,
    ) -> bool {
        self.slots[pid as usize]
            .compare_exchange(
                expected,
                new,
                AtomicOrdering::Release,
                AtomicOrdering::Acquire,
            )
            .is_ok()
    }

    fn allocate_pid(&self) -> Result<Pid> {
        let pid = self.pid_counter.fetch_add(1, AtomicOrdering::SeqCst);
        if pid as usize >= MAPPING_TABLE_CAPACITY {
            bail!("resource exhaustion: mapping table is full");
        }
        Ok(pid)
    }

    /// Whether `key` falls in the `(low, high]` range; `None` is unbounded.
    fn within(&self, key: &K, low: &Option<K>, high: &Option<K>) -> bool {
        let above_low = match low {
            None => true,
            Some(low) => self.key_cmp(key, low) == Ordering::Greater,
        };
        let below_high = match high {
            None => true,
            Some(high) => self.key_cmp(key, high) != Ordering::Greater,
        };
        above_low && below_high
    }

    fn locate(&self, key: &K) -> Result<Located<K, V>> {
        let mut pid = ROOT_PID;
        let mut parent = ROOT_PID;
        let mut steps = 0usize;
        'descend: loop {
            let head = self.load_head(pid)?;
            let mut node = head;
            loop {
                steps += 1;
                if steps > MAX_TRAVERSAL_STEPS {
                    return corruption(format!(
                        "traversal exceeded {} records at page {}",
                        MAX_TRAVERSAL_STEPS, pid
                    ));
                }
                let page = unsafe { &*node };
                match &page.record {
                    Record::Inner(inner) => {
                        if inner.entries.is_empty() {
                            if pid == ROOT_PID {
                                return Ok(Located::EmptyRoot { head });
                            }
                            return corruption(format!("inner page {} has no children", pid));
                        }
                        parent = pid;
                        pid = self.route_inner(pid, inner, key)?;
                        continue 'descend;
                    }
                    Record::IndexTerm(term) => {
                        if self.within(key, &term.low, &term.high) {
                            parent = pid;
                            pid = term.child;
                            continue 'descend;
                        }
                    }
                    Record::Split(split) => {
                        if self.key_cmp(key, &split.split_key) == Ordering::Greater {
                            pid = split.sibling;
                            continue 'descend;
                        }
                    }
                    Record::RemoveNode(removed) => {
                        pid = removed.left;
                        continue 'descend;
                    }
                    Record::NodeMerge(merge) => {
                        if self.key_cmp(key, &merge.merge_key) == Ordering::Greater {
                            let values = self.lookup_entries(&merge.entries, key);
                            return Ok(Located::Leaf {
                                pid,
                                parent,
                                head,
                                values,
                            });
                        }
                    }
                    Record::Modify(modify) => {
                        if self.key_eq.eq(&modify.key, key) {
                            return Ok(Located::Leaf {
                                pid,
                                parent,
                                head,
                                values: modify.values.clone(),
                            });
                        }
                    }
                    Record::Leaf(leaf) => {
                        self.verify_sorted(&leaf.entries)?;
                        let values = self.lookup_entries(&leaf.entries, key);
                        return Ok(Located::Leaf {
                            pid,
                            parent,
                            head,
                            values,
                        });
                    }
                }
                node = page.next;
                if node.is_null() {
                    return corruption(format!(
                        "delta chain of page {} ends without a base node",
                        pid
                    ));
                }
            }
        }
    }

    fn route_inner(&self, pid: Pid, inner: &InnerNode<K>, key: &K) -> Result<Pid> {
        if !self.within(key, &inner.low_key, &inner.high_key) {
            return corruption(format!("key outside the bounds of inner page {}", pid));
        }
        let idx = inner.entries.partition_point(|(sep, _)| match sep {
            Some(sep) => self.key_cmp(sep, key) == Ordering::Less,
            None => false,
        });
        match inner.entries.get(idx) {
            Some((_, child)) => Ok(*child),
            None => corruption(format!(
                "key routes past the high bound of inner page {}",
                pid
            )),
        }
    }

    fn lookup_entries(&self, entries: &[(K, ValueList<V>)], key: &K) -> ValueList<V> {
        match entries.binary_search_by(|(k, _)| self.key_cmp(k, key)) {
            Ok(idx) => entries[idx].1.clone(),
            Err(_) => ValueList::new(),
        }
    }

    fn verify_sorted(&self, entries: &[(K, ValueList<V>)]) -> Result<()> {
        for pair in entries.windows(2) {
            if self.key_cmp(&pair[0].0, &pair[1].0) != Ordering::Less {
                return corruption("leaf keys out of order".to_string());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    /// First insert into an empty tree: install a one-entry leaf and an
    /// absolute-range index term over the empty root. `None` means the
    /// installation race was lost and the caller retries.
    fn bootstrap_root(
        &self,
        key: &K,
        value: &V,
        observed: *mut PageNode<K, V>,
    ) -> Result<Option<bool>> {
        let mut values = ValueList::new();
        values.push(value.clone());
        let leaf_pid = self.allocate_pid()?;
        let leaf = PageNode::alloc(
            Record::Leaf(LeafNode {
                entries: vec![(key.clone(), values)],
                low_key: None,
                high_key: None,
                right_link: None,
            }),
            ptr::null_mut(),
        );
        self.slots[leaf_pid as usize].store(leaf, AtomicOrdering::Release);
        let term = PageNode::alloc(
            Record::IndexTerm(IndexTermDelta {
                low: None,
                high: None,
                child: leaf_pid,
            }),
            observed,
        );
        if self.publish(ROOT_PID, observed, term) {
            trace!(leaf_pid, "bootstrapped first leaf");
            Ok(Some(true))
        } else {
            // Lost the race: hand the tentative records and reserved PID to
            // the reclaimer and start over.
            self.slots[leaf_pid as usize].store(ptr::null_mut(), AtomicOrdering::Release);
            self.epoch.retire_node(term);
            self.epoch.retire_node(leaf);
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Consolidation and structural modification
    // ------------------------------------------------------------------

    fn finish_write(&self, pid: Pid, parent: Pid) -> Result<()> {
        if self.chain_length(pid)? > DELTA_CHAIN_THRESHOLD {
            self.consolidate_leaf(pid, parent)?;
        }
        Ok(())
    }

    fn chain_length(&self, pid: Pid) -> Result<usize> {
        let mut node = self.load_head(pid)?;
        let mut len = 0usize;
        while !node.is_null() {
            len += 1;
            if len > MAX_TRAVERSAL_STEPS {
                return corruption(format!("chain of page {} exceeds traversal bound", pid));
            }
            node = unsafe { (*node).next };
        }
        Ok(len)
    }

    /// Flattens a leaf chain into a single consolidated view. `None` when
    /// the chain belongs to an inner page. Caller must hold an epoch pin.
    pub(crate) fn assemble_leaf_view(
        &self,
        head: *mut PageNode<K, V>,
    ) -> Result<Option<LeafView<K, V>>> {
        let mut records: Vec<&Record<K, V>> = Vec::new();
        let mut removed = false;
        let mut node = head;
        loop {
            if node.is_null() {
                return corruption("delta chain ends without a base node".to_string());
            }
            if records.len() > MAX_TRAVERSAL_STEPS {
                return corruption("chain exceeds traversal bound".to_string());
            }
            let page = unsafe { &*node };
            match &page.record {
                Record::Inner(_) | Record::IndexTerm(_) => return Ok(None),
                Record::RemoveNode(_) => removed = true,
                _ => {}
            }
            records.push(&page.record);
            if matches!(page.record, Record::Leaf(_)) {
                break;
            }
            node = page.next;
        }

        // Fold base-first so newer records override older ones.
        let mut entries: Vec<(K, ValueList<V>)> = Vec::new();
        let mut low_key = None;
        let mut high_key = None;
        let mut right_link = None;
        for record in records.iter().rev() {
            match record {
                Record::Leaf(base) => {
                    entries = base.entries.clone();
                    low_key = base.low_key.clone();
                    high_key = base.high_key.clone();
                    right_link = base.right_link;
                }
                Record::NodeMerge(merge) => {
                    entries.extend(merge.entries.iter().cloned());
                    high_key = merge.high_key.clone();
                    right_link = merge.right_link;
                }
                Record::Split(split) => {
                    let keep = entries.partition_point(|(k, _)| {
                        self.key_cmp(k, &split.split_key) != Ordering::Greater
                    });
                    entries.truncate(keep);
                    high_key = Some(split.split_key.clone());
                    right_link = Some(split.sibling);
                }
                Record::Modify(modify) => {
                    match entries.binary_search_by(|(k, _)| self.key_cmp(k, &modify.key)) {
                        Ok(idx) => {
                            if modify.values.is_empty() {
                                entries.remove(idx);
                            } else {
                                entries[idx].1 = modify.values.clone();
                            }
                        }
                        Err(idx) => {
                            if !modify.values.is_empty() {
                                entries
                                    .insert(idx, (modify.key.clone(), modify.values.clone()));
                            }
                        }
                    }
                }
                Record::RemoveNode(_) => {}
                Record::Inner(_) | Record::IndexTerm(_) => {}
            }
        }
        self.verify_sorted(&entries)?;
        Ok(Some(LeafView {
            entries,
            low_key,
            high_key,
            right_link,
            removed,
        }))
    }

    fn consolidate_leaf(&self, pid: Pid, parent: Pid) -> Result<()> {
        let head = self.load_head(pid)?;
        let Some(view) = self.assemble_leaf_view(head)? else {
            return Ok(());
        };
        if view.removed {
            return Ok(());
        }
        let entry_count = view.entries.len();
        let base = PageNode::alloc(
            Record::Leaf(LeafNode {
                entries: view.entries,
                low_key: view.low_key,
                high_key: view.high_key,
                right_link: view.right_link,
            }),
            ptr::null_mut(),
        );
        if !self.publish(pid, head, base) {
            // A racing writer extended the chain; its own post-write check
            // will consolidate.
            unsafe { drop(Box::from_raw(base)) };
            return Ok(());
        }
        trace!(pid, entry_count, "consolidated leaf chain");
        self.epoch.retire_chain(head);
        if entry_count > LEAF_MAX_ENTRIES {
            self.split_leaf(pid, parent)?;
        } else if entry_count == 0 {
            self.merge_leaf(pid, parent)?;
        }
        Ok(())
    }

    fn split_leaf(&self, pid: Pid, parent: Pid) -> Result<()> {
        let head = self.load_head(pid)?;
        let page = unsafe { &*head };
        let Record::Leaf(base) = &page.record else {
            return Ok(());
        };
        if base.entries.len() <= LEAF_MAX_ENTRIES {
            return Ok(());
        }
        let mid = base.entries.len() / 2;
        let split_key = base.entries[mid - 1].0.clone();

        let sibling_pid = self.allocate_pid()?;
        let sibling = PageNode::alloc(
            Record::Leaf(LeafNode {
                entries: base.entries[mid..].to_vec(),
                low_key: Some(split_key.clone()),
                high_key: base.high_key.clone(),
                right_link: base.right_link,
            }),
            ptr::null_mut(),
        );
        self.slots[sibling_pid as usize].store(sibling, AtomicOrdering::Release);

        let split = PageNode::alloc(
            Record::Split(SplitDelta {
                split_key: split_key.clone(),
                sibling: sibling_pid,
            }),
            head,
        );
        if !self.publish(pid, head, split) {
            self.slots[sibling_pid as usize].store(ptr::null_mut(), AtomicOrdering::Release);
            self.epoch.retire_node(sibling);
            unsafe { drop(Box::from_raw(split)) };
            return Ok(());
        }
        trace!(pid, sibling_pid, "published split delta");

        let term = IndexTermDelta {
            low: Some(split_key),
            high: base.high_key.clone(),
            child: sibling_pid,
        };
        self.install_index_term(parent, term)
    }

    fn merge_leaf(&self, pid: Pid, parent: Pid) -> Result<()> {
        if pid == ROOT_PID {
            return Ok(());
        }
        let parent_head = self.load_head(parent)?;
        let Some(parent_view) = self.assemble_inner_view(parent_head)? else {
            return Ok(());
        };
        let Some(idx) = parent_view.claims.iter().position(|c| c.child == pid) else {
            return Ok(());
        };
        if idx == 0 {
            // The leftmost page has no left sibling to merge into.
            return Ok(());
        }
        let left_claim = parent_view.claims[idx - 1].clone();

        let head = self.load_head(pid)?;
        let Some(view) = self.assemble_leaf_view(head)? else {
            return Ok(());
        };
        if view.removed || !view.entries.is_empty() {
            return Ok(());
        }
        let Some(merge_key) = view.low_key.clone() else {
            return Ok(());
        };

        // Step 1: mark the page removed; readers follow to the survivor.
        let remove = PageNode::alloc(
            Record::RemoveNode(RemoveNodeDelta {
                left: left_claim.child,
            }),
            head,
        );
        if !self.publish(pid, head, remove) {
            unsafe { drop(Box::from_raw(remove)) };
            return Ok(());
        }
        trace!(pid, left = left_claim.child, "published remove-node delta");

        // Step 2: the left sibling absorbs the key range. The absorbed
        // entry list is empty (only empty pages merge), so even if every
        // retry loses, no key becomes unreachable.
        for _ in 0..CAS_RETRY_LIMIT {
            let left_head = self.load_head(left_claim.child)?;
            let node = PageNode::alloc(
                Record::NodeMerge(NodeMergeDelta {
                    merge_key: merge_key.clone(),
                    entries: view.entries.clone(),
                    right_link: view.right_link,
                    high_key: view.high_key.clone(),
                }),
                left_head,
            );
            if self.publish(left_claim.child, left_head, node) {
                trace!(pid, left = left_claim.child, "published node-merge delta");
                break;
            }
            unsafe { drop(Box::from_raw(node)) };
        }

        // Step 3: widen the parent's routing term over both ranges.
        let term = IndexTermDelta {
            low: left_claim.low.clone(),
            high: view.high_key.clone(),
            child: left_claim.child,
        };
        self.install_index_term(parent, term)
    }

    fn install_index_term(&self, parent: Pid, term: IndexTermDelta<K>) -> Result<()> {
        for _ in 0..CAS_RETRY_LIMIT {
            let head = self.load_head(parent)?;
            let node = PageNode::alloc(
                Record::IndexTerm(IndexTermDelta {
                    low: term.low.clone(),
                    high: term.high.clone(),
                    child: term.child,
                }),
                head,
            );
            if self.publish(parent, head, node) {
                trace!(parent, child = term.child, "installed index term");
                if self.chain_length(parent)? > DELTA_CHAIN_THRESHOLD {
                    self.consolidate_inner(parent)?;
                }
                return Ok(());
            }
            unsafe { drop(Box::from_raw(node)) };
        }
        bail!(
            "resource exhaustion: parent update gave up after {} CAS retries",
            CAS_RETRY_LIMIT
        )
    }

    /// Flattens an inner chain into its disjoint routing claims, newest
    /// record winning where ranges overlap. `None` for leaf chains.
    pub(crate) fn assemble_inner_view(
        &self,
        head: *mut PageNode<K, V>,
    ) -> Result<Option<InnerView<K>>> {
        let mut terms: Vec<&IndexTermDelta<K>> = Vec::new();
        let mut node = head;
        let base;
        loop {
            if node.is_null() {
                return corruption("delta chain ends without a base node".to_string());
            }
            if terms.len() > MAX_TRAVERSAL_STEPS {
                return corruption("inner chain exceeds traversal bound".to_string());
            }
            let page = unsafe { &*node };
            match &page.record {
                Record::IndexTerm(term) => terms.push(term),
                Record::Inner(inner) => {
                    base = inner;
                    break;
                }
                _ => return Ok(None),
            }
            node = page.next;
        }

        let mut claims: Vec<Claim<K>> = Vec::new();
        let mut low = base.low_key.clone();
        for (sep, child) in &base.entries {
            claims.push(Claim {
                low: low.clone(),
                high: sep.clone(),
                child: *child,
            });
            low = sep.clone();
        }
        // Oldest term first; each newer term overrides the overlap.
        for term in terms.iter().rev() {
            self.apply_claim(
                &mut claims,
                Claim {
                    low: term.low.clone(),
                    high: term.high.clone(),
                    child: term.child,
                },
            );
        }
        Ok(Some(InnerView { claims }))
    }

    /// Splices `new` into the sorted disjoint claim list, trimming or
    /// dropping older claims it overlaps.
    fn apply_claim(&self, claims: &mut Vec<Claim<K>>, new: Claim<K>) {
        let mut result: Vec<Claim<K>> = Vec::with_capacity(claims.len() + 1);
        let mut inserted = false;
        for claim in claims.drain(..) {
            if self.high_le_low(&claim.high, &new.low) {
                result.push(claim);
            } else if self.high_le_low(&new.high, &claim.low) {
                if !inserted {
                    result.push(new.clone());
                    inserted = true;
                }
                result.push(claim);
            } else {
                if self.low_lt_low(&claim.low, &new.low) {
                    result.push(Claim {
                        low: claim.low.clone(),
                        high: new.low.clone(),
                        child: claim.child,
                    });
                }
                if !inserted {
                    result.push(new.clone());
                    inserted = true;
                }
                if self.high_lt_high(&new.high, &claim.high) {
                    result.push(Claim {
                        low: new.high.clone(),
                        high: claim.high.clone(),
                        child: claim.child,
                    });
                }
            }
        }
        if !inserted {
            result.push(new);
        }
        *claims = result;
    }

    /// `high <= low` with `None` = +inf on the high side, -inf on the low.
    fn high_le_low(&self, high: &Option<K>, low: &Option<K>) -> bool {
        match (high, low) {
            (Some(high), Some(low)) => self.key_cmp(high, low) != Ordering::Greater,
            _ => false,
        }
    }

    fn low_lt_low(&self, a: &Option<K>, b: &Option<K>) -> bool {
        match (a, b) {
            (None, Some(_)) => true,
            (Some(a), Some(b)) => self.key_cmp(a, b) == Ordering::Less,
            _ => false,
        }
    }

    fn high_lt_high(&self, a: &Option<K>, b: &Option<K>) -> bool {
        match (a, b) {
            (Some(_), None) => true,
            (Some(a), Some(b)) => self.key_cmp(a, b) == Ordering::Less,
            _ => false,
        }
    }

    fn consolidate_inner(&self, pid: Pid) -> Result<()> {
        let head = self.load_head(pid)?;
        let Some(view) = self.assemble_inner_view(head)? else {
            return Ok(());
        };
        let low_key = view.claims.first().and_then(|c| c.low.clone());
        let high_key = view.claims.last().and_then(|c| c.high.clone());
        let entries = view
            .claims
            .iter()
            .map(|c| (c.high.clone(), c.child))
            .collect();
        let base = PageNode::alloc(
            Record::Inner(InnerNode {
                entries,
                low_key,
                high_key,
            }),
            ptr::null_mut(),
        );
        if self.publish(pid, head, base) {
            trace!(pid, "consolidated inner chain");
            self.epoch.retire_chain(head);
        } else {
            unsafe { drop(Box::from_raw(base)) };
        }
        Ok(())
    }

    /// First leaf in key order, or `None` for an empty tree. Caller must
    /// hold an epoch pin.
    pub(crate) fn leftmost_leaf(&self) -> Result<Option<Pid>> {
        let mut pid = ROOT_PID;
        let mut depth = 0usize;
        loop {
            depth += 1;
            if depth > MAX_TRAVERSAL_STEPS {
                return corruption("descent exceeds traversal bound".to_string());
            }
            let head = self.load_head(pid)?;
            match self.assemble_inner_view(head)? {
                Some(view) => {
                    let Some(first) = view.claims.first() else {
                        return Ok(None);
                    };
                    pid = first.child;
                }
                None => return Ok(Some(pid)),
            }
        }
    }
}

impl<K, V, C, E> Drop for BwTree<K, V, C, E> {
    fn drop(&mut self) {
        let allocated = (self.pid_counter.load(AtomicOrdering::SeqCst) as usize)
            .min(MAPPING_TABLE_CAPACITY);
        for slot in self.slots[..allocated].iter() {
            let mut node = slot.swap(ptr::null_mut(), AtomicOrdering::AcqRel);
            while !node.is_null() {
                let next = unsafe { (*node).next };
                drop(unsafe { Box::from_raw(node) });
                node = next;
            }
        }
        self.epoch.drain_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_search_is_empty() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        assert!(tree.search(&42).unwrap().is_empty());
    }

    #[test]
    fn first_insert_bootstraps_the_root() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        assert!(tree.insert(&5, &100).unwrap());
        assert_eq!(tree.search(&5).unwrap(), vec![100]);
        assert!(tree.search(&4).unwrap().is_empty());
    }

    #[test]
    fn duplicate_policy_disallowed() {
        let tree: BwTree<i64, u64> = BwTree::ordered(false);
        assert!(tree.insert(&5, &1).unwrap());
        assert!(!tree.insert(&5, &2).unwrap());
        assert_eq!(tree.search(&5).unwrap(), vec![1]);
    }

    #[test]
    fn duplicate_policy_allowed() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        assert!(tree.insert(&5, &1).unwrap());
        assert!(tree.insert(&5, &2).unwrap());
        let mut found = tree.search(&5).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn identical_pair_reinsert_succeeds_without_change() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        assert!(tree.insert(&5, &1).unwrap());
        assert!(tree.insert(&5, &1).unwrap());
        assert_eq!(tree.search(&5).unwrap(), vec![1]);
    }

    #[test]
    fn insert_delete_round_trip() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        tree.insert(&7, &70).unwrap();
        assert!(tree.delete(&7, &70).unwrap());
        assert!(tree.search(&7).unwrap().is_empty());
        assert!(!tree.delete(&7, &70).unwrap());
    }

    #[test]
    fn delete_removes_only_the_named_pair() {
        let tree: BwTree<i64, u64> = BwTree::ordered(true);
        tree.insert(&7, &70).unwrap();
        tree.insert(&7, &71).unwrap();
        assert!(tree.delete(&7, &70).unwrap());
        assert_eq!(tree.search(&7).unwrap(), vec![71]);
    }

    #[test]
    fn reinsert_after_delete_with_duplicates_disallowed() {
        let tree: BwTree<i64, u64> = BwTree::ordered(false);
        tree.insert(&3, &1).unwrap();
        tree.delete(&3, &1).unwrap();
        assert!(tree.insert(&3, &2).unwrap());
        assert_eq!(tree.search(&3).unwrap(), vec![2]);
    }

    #[test]
    fn many_inserts_survive_consolidation_and_splits() {
        let tree: BwTree<i64, u64> = BwTree::ordered(false);
        for key in 0..1000i64 {
            assert!(tree.insert(&key, &(key as u64 * 10)).unwrap());
        }
        for key in 0..1000i64 {
            assert_eq!(tree.search(&key).unwrap(), vec![key as u64 * 10], "key {}", key);
        }
        assert!(tree.search(&1000).unwrap().is_empty());
    }

    #[test]
    fn deletes_across_splits() {
        let tree: BwTree<i64, u64> = BwTree::ordered(false);
        for key in 0..500i64 {
            tree.insert(&key, &(key as u64)).unwrap();
        }
        for key in (0..500i64).step_by(2) {
            assert!(tree.delete(&key, &(key as u64)).unwrap());
        }
        for key in 0..500i64 {
            let found = tree.search(&key).unwrap();
            if key % 2 == 0 {
                assert!(found.is_empty(), "key {} should be gone", key);
            } else {
                assert_eq!(found, vec![key as u64]);
            }
        }
    }

    #[test]
    fn emptied_pages_merge_away() {
        let tree: BwTree<i64, u64> = BwTree::ordered(false);
        for key in 0..300i64 {
            tree.insert(&key, &(key as u64)).unwrap();
        }
        for key in 0..300i64 {
            assert!(tree.delete(&key, &(key as u64)).unwrap());
        }
        for key in 0..300i64 {
            assert!(tree.search(&key).unwrap().is_empty());
        }
        // The range is reusable after total deletion.
        assert!(tree.insert(&150, &1).unwrap());
        assert_eq!(tree.search(&150).unwrap(), vec![1]);
    }
}
