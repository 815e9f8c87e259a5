//! # Epoch-Based Page Reclamation
//!
//! Delta records superseded by CAS cannot be freed while a concurrent
//! traversal may still hold a pointer into the old chain. Reclamation is
//! deferred through epochs:
//!
//! 1. Every traversal pins the current epoch in a fixed slot array before
//!    touching a chain head and releases the slot when it finishes.
//! 2. Retired records are queued with the epoch current at retirement.
//! 3. A record is freed once the watermark (the minimum epoch across all
//!    pinned slots) has advanced past its retirement epoch; no pinned
//!    thread can still see it.
//!
//! ## Slot Array
//!
//! The slot array mirrors the transaction manager's active-slot design:
//!
//! ```text
//! EpochManager {
//!     global:    AtomicU64,              // monotonically increasing epoch
//!     slots:     [AtomicU64; 64],        // pinned epoch per thread, 0 = free
//!     slot_lock: Mutex<()>,              // slot claim only
//!     garbage:   Mutex<Vec<retired>>,    // (epoch, record | chain)
//! }
//! ```
//!
//! Slot claim takes the mutex; release and watermark computation are
//! lock-free loads/stores. Collection runs opportunistically when a guard
//! drops.
//!
//! ## Retirement Granularity
//!
//! Two granularities exist and must not be confused: a single record whose
//! `next` still points into a live chain (a failed-CAS leftover that was
//! briefly published, or an abandoned bootstrap page), and a whole chain
//! replaced by consolidation, which is freed by walking its `next` links.

use super::delta::PageNode;
use crate::config::EPOCH_SLOTS;
use eyre::{bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

enum Retired<K, V> {
    /// Free exactly this record; its tail is still live.
    Node(*mut PageNode<K, V>),
    /// Free this record and everything reachable through `next`.
    Chain(*mut PageNode<K, V>),
}

pub(crate) struct EpochManager<K, V> {
    global: AtomicU64,
    slots: [AtomicU64; EPOCH_SLOTS],
    slot_lock: Mutex<()>,
    garbage: Mutex<Vec<(u64, Retired<K, V>)>>,
}

unsafe impl<K: Send, V: Send> Send for EpochManager<K, V> {}
unsafe impl<K: Send, V: Send> Sync for EpochManager<K, V> {}

impl<K, V> EpochManager<K, V> {
    #[allow(clippy::declare_interior_mutable_const)]
    pub(crate) fn new() -> Self {
        const INIT: AtomicU64 = AtomicU64::new(0);
        Self {
            global: AtomicU64::new(1),
            #[allow(clippy::borrow_interior_mutable_const)]
            slots: [INIT; EPOCH_SLOTS],
            slot_lock: Mutex::new(()),
            garbage: Mutex::new(Vec::new()),
        }
    }

    /// Pins the current epoch. The returned guard keeps every record
    /// retired from now on alive until the guard drops.
    pub(crate) fn pin(&self) -> Result<EpochGuard<'_, K, V>> {
        let _claim = self.slot_lock.lock();
        let epoch = self.global.fetch_add(1, Ordering::SeqCst);
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.load(Ordering::Relaxed) == 0 {
                slot.store(epoch, Ordering::SeqCst);
                return Ok(EpochGuard {
                    manager: self,
                    slot: idx,
                });
            }
        }
        bail!(
            "resource exhaustion: more than {} threads pinned in the index",
            EPOCH_SLOTS
        )
    }

    pub(crate) fn retire_node(&self, node: *mut PageNode<K, V>) {
        let epoch = self.global.load(Ordering::SeqCst);
        self.garbage.lock().push((epoch, Retired::Node(node)));
    }

    pub(crate) fn retire_chain(&self, head: *mut PageNode<K, V>) {
        let epoch = self.global.load(Ordering::SeqCst);
        self.garbage.lock().push((epoch, Retired::Chain(head)));
    }

    fn watermark(&self) -> u64 {
        let mut min = self.global.load(Ordering::SeqCst);
        for slot in &self.slots {
            let pinned = slot.load(Ordering::SeqCst);
            if pinned != 0 && pinned < min {
                min = pinned;
            }
        }
        min
    }

    /// Frees every retired item whose epoch is strictly below the
    /// watermark.
    pub(crate) fn collect(&self) {
        let watermark = self.watermark();
        let mut garbage = self.garbage.lock();
        let mut kept = Vec::with_capacity(garbage.len());
        for (epoch, item) in garbage.drain(..) {
            if epoch < watermark {
                unsafe { free_retired(item) };
            } else {
                kept.push((epoch, item));
            }
        }
        *garbage = kept;
    }

    /// Frees everything unconditionally. Only sound when no thread can be
    /// pinned, i.e. from the owning tree's `Drop`.
    pub(crate) fn drain_all(&self) {
        let mut garbage = self.garbage.lock();
        for (_, item) in garbage.drain(..) {
            unsafe { free_retired(item) };
        }
    }
}

unsafe fn free_retired<K, V>(item: Retired<K, V>) {
    match item {
        Retired::Node(node) => {
            drop(Box::from_raw(node));
        }
        Retired::Chain(mut node) => {
            while !node.is_null() {
                let next = (*node).next;
                drop(Box::from_raw(node));
                node = next;
            }
        }
    }
}

pub(crate) struct EpochGuard<'a, K, V> {
    manager: &'a EpochManager<K, V>,
    slot: usize,
}

impl<K, V> Drop for EpochGuard<'_, K, V> {
    fn drop(&mut self) {
        self.manager.slots[self.slot].store(0, Ordering::SeqCst);
        self.manager.collect();
    }
}
