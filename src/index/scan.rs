//! # Range Scans
//!
//! Lazy ordered iteration over `(key, value)` pairs. A scan pins an epoch
//! for its whole lifetime, flattens one leaf chain at a time into a
//! buffer, and follows right-sibling links until the high bound or the
//! rightmost leaf. Re-calling [`BwTree::range_scan`] restarts the scan
//! from scratch.
//!
//! A leaf observed mid-merge can re-serve keys that were already emitted
//! through the survivor's merge record; entries at or below the last
//! emitted key are skipped to keep the output strictly ascending.

use super::bwtree::{corruption, BwTree, KeyComparator, KeyEquality};
use super::delta::Pid;
use super::epoch::EpochGuard;
use std::cmp::Ordering;

/// Key-range bounds with per-side inclusivity.
#[derive(Debug, Clone)]
pub struct ScanBounds<K> {
    pub low: Option<K>,
    pub high: Option<K>,
    pub low_inclusive: bool,
    pub high_inclusive: bool,
}

impl<K> ScanBounds<K> {
    /// Unbounded scan over the whole tree.
    pub fn all() -> Self {
        Self {
            low: None,
            high: None,
            low_inclusive: true,
            high_inclusive: true,
        }
    }

    pub fn range(
        low: Option<K>,
        high: Option<K>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Self {
        Self {
            low,
            high,
            low_inclusive,
            high_inclusive,
        }
    }

    /// Bounds matching exactly one key.
    pub fn point(key: K) -> Self
    where
        K: Clone,
    {
        Self {
            low: Some(key.clone()),
            high: Some(key),
            low_inclusive: true,
            high_inclusive: true,
        }
    }
}

pub struct RangeScan<'t, K, V, C, E> {
    tree: &'t BwTree<K, V, C, E>,
    _guard: EpochGuard<'t, K, V>,
    bounds: ScanBounds<K>,
    buffer: Vec<(K, V)>,
    cursor: usize,
    next_pid: Option<Pid>,
    last_key: Option<K>,
    failed: bool,
}

impl<'t, K, V, C, E> RangeScan<'t, K, V, C, E>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
    E: KeyEquality<K>,
{
    pub(crate) fn new(
        tree: &'t BwTree<K, V, C, E>,
        guard: EpochGuard<'t, K, V>,
        bounds: ScanBounds<K>,
        start: Option<Pid>,
    ) -> Self {
        Self {
            tree,
            _guard: guard,
            bounds,
            buffer: Vec::new(),
            cursor: 0,
            next_pid: start,
            last_key: None,
            failed: false,
        }
    }

    /// Loads the next leaf's in-bounds pairs into the buffer. `false` once
    /// the scan is exhausted.
    fn refill(&mut self) -> eyre::Result<bool> {
        while let Some(pid) = self.next_pid {
            let head = self.tree.load_head_for_scan(pid)?;
            let Some(view) = self.tree.assemble_leaf_view(head)? else {
                return corruption(format!("scan reached non-leaf page {}", pid));
            };
            self.next_pid = view.right_link;

            let mut fresh = Vec::new();
            let mut past_high = false;
            for (key, values) in view.entries {
                if let Some(last) = &self.last_key {
                    if self.tree.key_cmp(&key, last) != Ordering::Greater {
                        continue;
                    }
                }
                if let Some(low) = &self.bounds.low {
                    let ord = self.tree.key_cmp(&key, low);
                    if ord == Ordering::Less || (ord == Ordering::Equal && !self.bounds.low_inclusive)
                    {
                        continue;
                    }
                }
                if let Some(high) = &self.bounds.high {
                    let ord = self.tree.key_cmp(&key, high);
                    if ord == Ordering::Greater
                        || (ord == Ordering::Equal && !self.bounds.high_inclusive)
                    {
                        past_high = true;
                        break;
                    }
                }
                self.last_key = Some(key.clone());
                for value in values {
                    fresh.push((key.clone(), value));
                }
            }

            if past_high {
                self.next_pid = None;
            }
            if !fresh.is_empty() {
                self.buffer = fresh;
                self.cursor = 0;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<K, V, C, E> Iterator for RangeScan<'_, K, V, C, E>
where
    K: Clone,
    V: Clone + PartialEq,
    C: KeyComparator<K>,
    E: KeyEquality<K>,
{
    type Item = eyre::Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.cursor >= self.buffer.len() {
            match self.refill() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        let item = self.buffer[self.cursor].clone();
        self.cursor += 1;
        Some(Ok(item))
    }
}
