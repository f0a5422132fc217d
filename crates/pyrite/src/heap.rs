//! The reference-counted arena backing all composite values.
//!
//! Every heap-only value lives in a slot of the arena; `Value::Ref` handles
//! share a slot by reference count. Freed slots go on a free list and are
//! reused by later allocations, so long-running embedders that repeatedly
//! allocate and release containers keep a bounded slot count.
//!
//! The heap owns an [`AllocTracker`] that observes every allocation and
//! release. The default [`SizeClassTracker`] keeps the size-class metrics
//! (small vs. large objects, freed counts); [`NoopTracker`] compiles the
//! bookkeeping away.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use smallvec::smallvec;

use crate::{
    types::{List, ObjectProtocol, Type, protocol::RefStack},
    value::Value,
};

/// Allocations with an estimated size at or below this many bytes are
/// classified as small; everything above is large. Bookkeeping only: the
/// classification never affects how a value is accessed.
pub const SMALL_OBJECT_THRESHOLD: usize = 128;

/// Observer for heap allocations and releases.
///
/// `get_size` closures let implementations skip size estimation entirely
/// when they don't record it.
pub trait AllocTracker: fmt::Debug {
    /// Called for each heap allocation.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize);

    /// Called when a heap value is freed.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Number of small-class allocations recorded, if tracked.
    fn small_allocations(&self) -> Option<usize> {
        None
    }

    /// Number of large-class allocations recorded, if tracked.
    fn large_allocations(&self) -> Option<usize> {
        None
    }

    /// Number of freed objects recorded, if tracked.
    fn freed_objects(&self) -> Option<usize> {
        None
    }

    /// Total bytes of freed objects recorded, if tracked.
    fn freed_bytes(&self) -> Option<usize> {
        None
    }
}

/// The default tracker: classifies allocations by estimated size and counts
/// releases (count and bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SizeClassTracker {
    small_allocations: usize,
    large_allocations: usize,
    freed_objects: usize,
    freed_bytes: usize,
}

impl SizeClassTracker {
    /// Creates a tracker with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            small_allocations: 0,
            large_allocations: 0,
            freed_objects: 0,
            freed_bytes: 0,
        }
    }
}

impl AllocTracker for SizeClassTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) {
        if get_size() <= SMALL_OBJECT_THRESHOLD {
            self.small_allocations += 1;
        } else {
            self.large_allocations += 1;
        }
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.freed_objects += 1;
        self.freed_bytes += get_size();
    }

    fn small_allocations(&self) -> Option<usize> {
        Some(self.small_allocations)
    }

    fn large_allocations(&self) -> Option<usize> {
        Some(self.large_allocations)
    }

    fn freed_objects(&self) -> Option<usize> {
        Some(self.freed_objects)
    }

    fn freed_bytes(&self) -> Option<usize> {
        Some(self.freed_bytes)
    }
}

/// A tracker that records nothing; all hooks compile to no-ops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NoopTracker;

impl AllocTracker for NoopTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) {}

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}
}

/// Identifier of a heap slot.
///
/// Only meaningful for the heap that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    #[inline]
    fn index(self) -> usize {
        self.0
    }
}

/// The closed set of composite variants.
///
/// Every heap slot holds exactly one of these; operations dispatch to the
/// active variant by exhaustive match, so clone, equality and formatting are
/// defined per-variant rather than generically over payload bytes.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum HeapData {
    List(List),
}

impl HeapData {
    /// Static variant name, used for the per-type stats breakdown.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::List(_) => "List",
        }
    }

    pub(crate) fn py_type(&self) -> Type {
        match self {
            Self::List(list) => list.py_type(),
        }
    }

    pub(crate) fn py_len(&self) -> usize {
        match self {
            Self::List(list) => list.py_len(),
        }
    }

    pub(crate) fn py_iterable(&self) -> bool {
        match self {
            Self::List(list) => list.py_iterable(),
        }
    }

    pub(crate) fn py_eq(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.py_eq(b, heap),
        }
    }

    pub(crate) fn py_cmp(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.py_cmp(b, heap),
        }
    }

    pub(crate) fn py_getitem(&self, idx: i64, heap: &Heap<impl AllocTracker>) -> crate::exception::RunResult<Value> {
        match self {
            Self::List(list) => list.py_getitem(idx, heap),
        }
    }

    pub(crate) fn py_clone(&self, heap: &Heap<impl AllocTracker>) -> Self {
        match self {
            Self::List(list) => Self::List(list.py_clone(heap)),
        }
    }

    pub(crate) fn py_repr_fmt(
        &self,
        f: &mut impl fmt::Write,
        heap: &Heap<impl AllocTracker>,
        seen: &mut ahash::AHashSet<HeapId>,
    ) -> fmt::Result {
        match self {
            Self::List(list) => list.py_repr_fmt(f, heap, seen),
        }
    }

    pub(crate) fn py_estimate_size(&self) -> usize {
        match self {
            Self::List(list) => list.py_estimate_size(),
        }
    }

    pub(crate) fn py_dec_ref_ids(&self, stack: &mut RefStack) {
        match self {
            Self::List(list) => list.py_dec_ref_ids(stack),
        }
    }
}

fn serialize_atomic<S: serde::Serializer>(value: &AtomicUsize, serializer: S) -> Result<S::Ok, S::Error> {
    serde::Serialize::serialize(&value.load(Ordering::Relaxed), serializer)
}

fn deserialize_atomic<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<AtomicUsize, D::Error> {
    let value: usize = serde::Deserialize::deserialize(deserializer)?;
    Ok(AtomicUsize::new(value))
}

/// One live heap slot: a reference count plus the payload data.
///
/// The refcount is atomic only so `inc_ref` can take `&Heap` (interior
/// mutability); the heap itself is still single-threaded. The payload is
/// `Option` so it can be taken out temporarily while a container method
/// needs both the data and the heap mutably.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct HeapValue {
    #[serde(serialize_with = "serialize_atomic", deserialize_with = "deserialize_atomic")]
    refcount: AtomicUsize,
    /// The payload data. Temporarily `None` while borrowed via `with_data_mut`.
    data: Option<HeapData>,
}

/// Reference-counted arena for composite values.
///
/// Slots freed by `dec_ref` go on the free list and are reused by later
/// allocations. Generic over the [`AllocTracker`] observing allocations;
/// the default [`SizeClassTracker`] keeps size-class metrics.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Heap<T: AllocTracker = SizeClassTracker> {
    entries: Vec<Option<HeapValue>>,
    /// Ids of freed slots available for reuse. Populated by `dec_ref`,
    /// consumed by `allocate`.
    free_list: Vec<HeapId>,
    tracker: T,
}

impl Heap<SizeClassTracker> {
    /// Creates an empty heap with the default size-class tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(SizeClassTracker::new())
    }
}

impl Default for Heap<SizeClassTracker> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AllocTracker> Heap<T> {
    /// Creates an empty heap with an explicit tracker.
    #[must_use]
    pub fn with_tracker(tracker: T) -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            tracker,
        }
    }

    /// Allocates a fresh, fully initialized list object and returns the
    /// handle wrapping it. The caller owns the returned reference.
    pub fn new_list(&mut self, items: Vec<Value>) -> Value {
        let id = self.allocate(HeapData::List(List::new(items)));
        Value::Ref(id)
    }

    /// Stores `data` in a slot with refcount 1, reusing a freed slot when
    /// one is available.
    pub(crate) fn allocate(&mut self, data: HeapData) -> HeapId {
        self.tracker.on_allocate(|| data.py_estimate_size());
        let entry = HeapValue {
            refcount: AtomicUsize::new(1),
            data: Some(data),
        };
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(entry);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(Some(entry));
            id
        }
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// Uses interior mutability for the refcount, so only shared access to
    /// the heap is required.
    ///
    /// # Panics
    /// Panics if the id is invalid or the value has already been freed.
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self
            .entries
            .get(id.index())
            .expect("Heap::inc_ref: slot missing")
            .as_ref()
            .expect("Heap::inc_ref: object already freed");
        entry.refcount.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the reference count and frees the value (plus children)
    /// once it hits zero. Freed slot ids go on the free list for reuse.
    ///
    /// Child references are released iteratively through a work stack, so
    /// deeply nested structures cannot overflow the call stack.
    ///
    /// # Panics
    /// Panics if the id is invalid or the value has already been freed.
    pub fn dec_ref(&mut self, id: HeapId) {
        let mut stack: RefStack = smallvec![id];
        while let Some(id) = stack.pop() {
            let slot = self.entries.get_mut(id.index()).expect("Heap::dec_ref: slot missing");
            let entry = slot.as_mut().expect("Heap::dec_ref: object already freed");
            let count = entry.refcount.load(Ordering::Relaxed);
            if count > 1 {
                entry.refcount.store(count - 1, Ordering::Relaxed);
                continue;
            }

            let freed = slot.take().expect("Heap::dec_ref: object already freed");
            self.free_list.push(id);
            if let Some(data) = freed.data {
                self.tracker.on_free(|| data.py_estimate_size());
                data.py_dec_ref_ids(&mut stack);
            }
        }
    }

    /// Returns the current reference count of a live slot.
    ///
    /// # Panics
    /// Panics if the id is invalid or the value has already been freed.
    #[must_use]
    pub fn ref_count(&self, id: HeapId) -> usize {
        self.entries
            .get(id.index())
            .expect("Heap::ref_count: slot missing")
            .as_ref()
            .expect("Heap::ref_count: object already freed")
            .refcount
            .load(Ordering::Relaxed)
    }

    /// Returns an immutable reference to the data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is invalid, the value has already been freed, or the
    /// data is currently borrowed via `with_data_mut`.
    pub(crate) fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
            .data
            .as_ref()
            .expect("Heap::get: data currently borrowed")
    }

    /// Runs `f` with the slot's data taken out of the arena, so the closure
    /// can hold the data and the heap mutably at the same time.
    ///
    /// Closures must not read the borrowed slot back through the heap;
    /// releasing handles (`dec_ref`) is fine since the caller's own handle
    /// keeps the borrowed slot's count above zero.
    pub(crate) fn with_data_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut HeapData, &mut Self) -> R) -> R {
        let mut data = self.take_data(id);
        let result = f(&mut data, self);
        self.restore_data(id, data);
        result
    }

    /// Exchanges the payloads of two live slots in place.
    ///
    /// Handles referencing either slot are untouched; they observe the
    /// swapped contents.
    ///
    /// # Panics
    /// Panics if either id is invalid, freed, or currently borrowed.
    pub fn swap_data(&mut self, a: HeapId, b: HeapId) {
        if a == b {
            return;
        }
        let data_a = self.take_data(a);
        let data_b = self.take_data(b);
        self.restore_data(a, data_b);
        self.restore_data(b, data_a);
    }

    fn take_data(&mut self, id: HeapId) -> HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::take_data: slot missing")
            .as_mut()
            .expect("Heap::take_data: object already freed")
            .data
            .take()
            .expect("Heap::take_data: data currently borrowed")
    }

    fn restore_data(&mut self, id: HeapId, data: HeapData) {
        let slot = self
            .entries
            .get_mut(id.index())
            .expect("Heap::restore_data: slot missing")
            .as_mut()
            .expect("Heap::restore_data: object already freed");
        debug_assert!(slot.data.is_none(), "Heap::restore_data: slot not borrowed");
        slot.data = Some(data);
    }

    /// Captures a snapshot of current heap state.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut live_objects = 0;
        let mut estimated_bytes = 0;
        for entry in self.entries.iter().flatten() {
            if let Some(data) = &entry.data {
                live_objects += 1;
                *objects_by_type.entry(data.type_name()).or_insert(0) += 1;
                estimated_bytes += data.py_estimate_size();
            }
        }
        HeapStats {
            live_objects,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
            estimated_bytes,
            small_allocations: self.tracker.small_allocations(),
            large_allocations: self.tracker.large_allocations(),
            freed_objects: self.tracker.freed_objects(),
            freed_bytes: self.tracker.freed_bytes(),
        }
    }
}

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration
/// order, making snapshots suitable for display and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by variant name (e.g., "List").
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Estimated bytes held by live objects.
    pub estimated_bytes: usize,
    /// Small-class allocation count, if the tracker records it.
    pub small_allocations: Option<usize>,
    /// Large-class allocation count, if the tracker records it.
    pub large_allocations: Option<usize>,
    /// Freed object count, if the tracker records it.
    pub freed_objects: Option<usize>,
    /// Freed bytes, if the tracker records it.
    pub freed_bytes: Option<usize>,
}

impl HeapStats {
    /// Computes the difference between `self` ("before") and `other`
    /// ("after"). Positive deltas indicate growth.
    #[must_use]
    pub fn diff(&self, other: &Self) -> HeapDiff {
        let (objects_by_type_delta, new_types, removed_types) =
            compute_type_deltas(&self.objects_by_type, &other.objects_by_type);
        HeapDiff {
            live_objects_delta: isize_delta(self.live_objects, other.live_objects),
            free_slots_delta: isize_delta(self.free_slots, other.free_slots),
            total_slots_delta: isize_delta(self.total_slots, other.total_slots),
            objects_by_type_delta,
            new_types,
            removed_types,
            estimated_bytes_delta: isize_delta(self.estimated_bytes, other.estimated_bytes),
            freed_objects_delta: optional_isize_delta(self.freed_objects, other.freed_objects),
        }
    }
}

/// Difference between two heap snapshots; see [`HeapStats::diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    /// Change in live object count (`after - before`).
    pub live_objects_delta: isize,
    /// Change in free slot count.
    pub free_slots_delta: isize,
    /// Change in total slot count.
    pub total_slots_delta: isize,
    /// Per-type deltas. Only includes types present in either snapshot.
    pub objects_by_type_delta: BTreeMap<&'static str, isize>,
    /// Types that appeared in "after" but not "before".
    pub new_types: Vec<&'static str>,
    /// Types that appeared in "before" but not "after".
    pub removed_types: Vec<&'static str>,
    /// Change in estimated live bytes.
    pub estimated_bytes_delta: isize,
    /// Change in freed object count (only if both snapshots have the value).
    pub freed_objects_delta: Option<isize>,
}

impl HeapDiff {
    /// Returns `true` when all deltas are zero and no types were added or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_objects_delta == 0
            && self.free_slots_delta == 0
            && self.total_slots_delta == 0
            && self.estimated_bytes_delta == 0
            && self.new_types.is_empty()
            && self.removed_types.is_empty()
            && self.objects_by_type_delta.values().all(|&v| v == 0)
            && self.freed_objects_delta.is_none_or(|d| d == 0)
    }
}

impl fmt::Display for HeapDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "HeapDiff: no changes");
        }
        write!(
            f,
            "HeapDiff: {:+} live objects, {:+} slots",
            self.live_objects_delta, self.total_slots_delta
        )?;
        for (&type_name, &delta) in &self.objects_by_type_delta {
            if delta != 0 {
                write!(f, "\n  {type_name}: {delta:+}")?;
            }
        }
        if !self.new_types.is_empty() {
            write!(f, "\n  New types: {}", self.new_types.join(", "))?;
        }
        if !self.removed_types.is_empty() {
            write!(f, "\n  Removed types: {}", self.removed_types.join(", "))?;
        }
        if self.estimated_bytes_delta != 0 {
            write!(f, "\n  Estimated bytes: {:+}", self.estimated_bytes_delta)?;
        }
        if let Some(freed_delta) = self.freed_objects_delta
            && freed_delta != 0
        {
            write!(f, "\n  Freed objects: {freed_delta:+}")?;
        }
        Ok(())
    }
}

/// Computes `after - before` as `isize`.
fn isize_delta(before: usize, after: usize) -> isize {
    #[expect(clippy::cast_possible_wrap, reason = "heap counts fit in isize")]
    let (before, after) = (before as isize, after as isize);
    after.wrapping_sub(before)
}

/// Computes the delta between two optional counters; `Some` only when both are.
fn optional_isize_delta(before: Option<usize>, after: Option<usize>) -> Option<isize> {
    match (before, after) {
        (Some(b), Some(a)) => Some(isize_delta(b, a)),
        _ => None,
    }
}

/// Computes per-type deltas, plus lists of new and removed types.
fn compute_type_deltas(
    before: &BTreeMap<&'static str, usize>,
    after: &BTreeMap<&'static str, usize>,
) -> (BTreeMap<&'static str, isize>, Vec<&'static str>, Vec<&'static str>) {
    let mut deltas = BTreeMap::new();
    let mut new_types = Vec::new();
    let mut removed_types = Vec::new();

    for (&type_name, &count) in before {
        let after_count = after.get(type_name).copied().unwrap_or(0);
        deltas.insert(type_name, isize_delta(count, after_count));
        if after_count == 0 {
            removed_types.push(type_name);
        }
    }
    for (&type_name, &count) in after {
        if !before.contains_key(type_name) {
            deltas.insert(type_name, isize_delta(0, count));
            new_types.push(type_name);
        }
    }

    (deltas, new_types, removed_types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reuses_freed_slots() {
        let mut heap = Heap::new();
        let first = heap.allocate(HeapData::List(List::default()));
        heap.dec_ref(first);
        let second = heap.allocate(HeapData::List(List::default()));
        assert_eq!(first, second, "freed slot should be reused");
        assert_eq!(heap.stats().total_slots, 1);
        heap.dec_ref(second);
    }

    #[test]
    fn inc_ref_keeps_slot_alive_until_last_release() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::List(List::default()));
        heap.inc_ref(id);
        assert_eq!(heap.ref_count(id), 2);
        heap.dec_ref(id);
        assert_eq!(heap.ref_count(id), 1);
        heap.dec_ref(id);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn size_class_tracker_splits_on_threshold() {
        let mut tracker = SizeClassTracker::new();
        tracker.on_allocate(|| SMALL_OBJECT_THRESHOLD);
        tracker.on_allocate(|| SMALL_OBJECT_THRESHOLD + 1);
        assert_eq!(tracker.small_allocations(), Some(1));
        assert_eq!(tracker.large_allocations(), Some(1));
    }

    #[test]
    fn swap_data_exchanges_payloads() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapData::List(List::new(vec![Value::Int(1)])));
        let b = heap.allocate(HeapData::List(List::new(vec![Value::Int(2), Value::Int(3)])));
        heap.swap_data(a, b);
        assert_eq!(heap.get(a).py_len(), 2);
        assert_eq!(heap.get(b).py_len(), 1);
        heap.dec_ref(a);
        heap.dec_ref(b);
    }

    #[test]
    fn diff_reports_growth_and_new_types() {
        let mut heap = Heap::new();
        let before = heap.stats();
        let list = heap.new_list(vec![]);
        let after = heap.stats();
        let diff = before.diff(&after);
        assert_eq!(diff.live_objects_delta, 1);
        assert_eq!(diff.new_types, vec!["List"]);
        assert!(!diff.is_empty());
        list.drop_with_heap(&mut heap);
    }
}
