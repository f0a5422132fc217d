//! The list composite variant: an ordered sequence of values with
//! Python-list method semantics.
//!
//! Indices are normalized before bounds-checking (negative index + current
//! length), duplicates and mixed element kinds are allowed, and elements may
//! themselves be heap references, so cyclic and shared substructure is fine.

use std::cmp::Ordering;

use ahash::AHashSet;

use crate::{
    exception::{ExcType, RunResult, SimpleException},
    heap::{AllocTracker, Heap, HeapId},
    types::{ObjectProtocol, Type, protocol::RefStack},
    value::Value,
};

/// Normalizes a possibly negative index against the current length.
///
/// The result is not bounds-checked; each operation applies its own range.
pub(crate) fn normalize_index(idx: i64, len: usize) -> i64 {
    #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
    let len = len as i64;
    if idx < 0 { idx + len } else { idx }
}

/// Validates a slice step: only forward strides are defined.
pub(crate) fn check_slice_step(step: i64) -> RunResult<()> {
    if step == 0 {
        return Err(ExcType::value_error("slice step cannot be zero"));
    }
    if step < 0 {
        return Err(ExcType::value_error("slice step must be positive"));
    }
    Ok(())
}

/// Resolves slice bounds against a sequence length.
///
/// Both bounds are normalized independently; `start >= stop` selects the
/// empty sequence (`None`). Otherwise both bounds are range-checked against
/// `[0, len]` and returned as offsets.
pub(crate) fn resolve_slice_bounds(start: i64, stop: i64, len: usize) -> RunResult<Option<(usize, usize)>> {
    let start = normalize_index(start, len);
    let stop = normalize_index(stop, len);
    if start >= stop {
        return Ok(None);
    }
    #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
    let len = len as i64;
    for bound in [start, stop] {
        if bound < 0 || bound > len {
            return Err(ExcType::index_error(format!("slice index {bound} out of range")));
        }
    }
    #[expect(clippy::cast_sign_loss, reason = "bounds validated non-negative")]
    let bounds = (start as usize, stop as usize);
    Ok(Some(bounds))
}

/// An ordered sequence of dynamic values.
///
/// Backed by a `Vec<Value>`; elements are owned handles, so every removal
/// path releases them through the heap.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct List {
    items: Vec<Value>,
}

impl List {
    /// Creates a list taking ownership of the given element handles.
    #[inline]
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Returns the number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the list is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the element slice.
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Appends an element at the end. Always succeeds.
    #[inline]
    pub fn push(&mut self, item: Value) {
        self.items.push(item);
    }

    /// Inserts `item` before the element currently at `idx`.
    ///
    /// The index is normalized, then must land in `[0, len]`. On failure the
    /// item is released and nothing is inserted.
    pub fn insert(&mut self, idx: i64, item: Value, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        let normalized = normalize_index(idx, self.items.len());
        #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
        let len = self.items.len() as i64;
        if normalized < 0 || normalized > len {
            item.drop_with_heap(heap);
            return Err(ExcType::index_error(format!("{idx} is out of range")));
        }
        #[expect(clippy::cast_sign_loss, reason = "insert index validated non-negative")]
        self.items.insert(normalized as usize, item);
        Ok(())
    }

    /// Removes and returns the element at `idx` (default last).
    ///
    /// The index is normalized and must land in `[0, len - 1]`.
    pub fn pop(&mut self, idx: i64) -> RunResult<Value> {
        if self.items.is_empty() {
            return Err(ExcType::index_error_pop_empty_list());
        }
        let normalized = normalize_index(idx, self.items.len());
        #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
        let len = self.items.len() as i64;
        if normalized < 0 || normalized >= len {
            return Err(ExcType::index_error_pop_out_of_range());
        }
        #[expect(clippy::cast_sign_loss, reason = "pop index validated non-negative")]
        let pos = normalized as usize;
        Ok(self.items.remove(pos))
    }

    /// Position of the first element equal to `target`, if any.
    ///
    /// Read-only so callers can locate before mutating; pairs with
    /// [`List::remove_at`].
    #[must_use]
    pub fn position(&self, target: &Value, heap: &Heap<impl AllocTracker>) -> Option<usize> {
        self.items.iter().position(|item| item.py_eq(target, heap))
    }

    /// Removes and returns the element at a known-valid position.
    ///
    /// # Panics
    /// Panics if `pos` is out of bounds; callers locate it via [`List::position`].
    #[must_use]
    pub fn remove_at(&mut self, pos: usize) -> Value {
        self.items.remove(pos)
    }

    /// Returns the position of the first element equal to `target`.
    pub fn index_of(&self, target: &Value, heap: &Heap<impl AllocTracker>) -> RunResult<i64> {
        for (idx, item) in self.items.iter().enumerate() {
            if item.py_eq(target, heap) {
                #[expect(clippy::cast_possible_wrap, reason = "sequence index fits in i64")]
                return Ok(idx as i64);
            }
        }
        Err(ExcType::value_error(format!("{} is not in list", target.repr(heap))))
    }

    /// Counts the elements equal to `target`. Never fails.
    #[must_use]
    pub fn count(&self, target: &Value, heap: &Heap<impl AllocTracker>) -> i64 {
        let mut count = 0;
        for item in &self.items {
            if item.py_eq(target, heap) {
                count += 1;
            }
        }
        count
    }

    /// Appends a batch of already materialized element handles.
    ///
    /// Extension is all-or-nothing: callers materialize the source iterable
    /// first, so a non-iterable operand fails before any mutation.
    pub fn extend_with(&mut self, items: Vec<Value>) {
        self.items.extend(items);
    }

    /// Removes all elements, releasing each through the heap.
    pub fn clear(&mut self, heap: &mut Heap<impl AllocTracker>) {
        for item in self.items.drain(..) {
            item.drop_with_heap(heap);
        }
    }

    /// Reverses element order in place.
    pub fn reverse(&mut self) {
        self.items.reverse();
    }

    /// Selects every element at `start, start + step, …` strictly before `stop`.
    ///
    /// Bounds follow [`resolve_slice_bounds`]; the step must already be
    /// validated positive. Returns a new list of shared element handles.
    pub fn slice(&self, start: i64, stop: i64, step: i64, heap: &Heap<impl AllocTracker>) -> RunResult<Self> {
        let Some((start, stop)) = resolve_slice_bounds(start, stop, self.items.len())? else {
            return Ok(Self::default());
        };
        #[expect(clippy::cast_sign_loss, reason = "step validated positive by the caller")]
        let step = step as usize;
        let items = (start..stop)
            .step_by(step)
            .map(|idx| self.items[idx].clone_with_heap(heap))
            .collect();
        Ok(Self { items })
    }

    /// Concatenation: a new list with this list's elements followed by
    /// `other`'s, neither input mutated.
    #[must_use]
    pub fn concat(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> Self {
        let mut items = Vec::with_capacity(self.items.len() + other.items.len());
        items.extend(self.items.iter().map(|item| item.clone_with_heap(heap)));
        items.extend(other.items.iter().map(|item| item.clone_with_heap(heap)));
        Self { items }
    }

    /// Computes the stable sorted permutation of the current elements.
    ///
    /// An incomparable pair raises TypeError without touching the list; the
    /// caller commits the permutation via [`List::apply_order`] only after
    /// every comparison has succeeded, so a failed sort is all-or-nothing.
    pub fn sorted_order(&self, heap: &Heap<impl AllocTracker>) -> RunResult<Vec<usize>> {
        let mut incomparable: Option<(Type, Type)> = None;
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| {
            if incomparable.is_some() {
                return Ordering::Equal;
            }
            match self.items[a].py_cmp(&self.items[b], heap) {
                Some(ord) => ord,
                None => {
                    incomparable = Some((self.items[a].py_type(heap), self.items[b].py_type(heap)));
                    Ordering::Equal
                }
            }
        });
        match incomparable {
            Some((left, right)) => Err(ExcType::type_error_not_comparable(left, right)),
            None => Ok(order),
        }
    }

    /// Reorders the elements by a permutation from [`List::sorted_order`].
    ///
    /// # Panics
    /// Panics if `order` is not a permutation of `0..len`.
    pub fn apply_order(&mut self, order: Vec<usize>) {
        debug_assert_eq!(order.len(), self.items.len());
        let mut slots: Vec<Option<Value>> = std::mem::take(&mut self.items).into_iter().map(Some).collect();
        self.items = order
            .into_iter()
            .map(|idx| slots[idx].take().expect("each index appears exactly once"))
            .collect();
    }
}

impl ObjectProtocol for List {
    fn py_type(&self) -> Type {
        Type::List
    }

    fn py_len(&self) -> usize {
        self.items.len()
    }

    fn py_iterable(&self) -> bool {
        true
    }

    fn py_eq(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> bool {
        if self.items.len() != other.items.len() {
            return false;
        }
        self.items
            .iter()
            .zip(other.items.iter())
            .all(|(a, b)| a.py_eq(b, heap))
    }

    fn py_cmp(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> Option<Ordering> {
        let min_len = self.items.len().min(other.items.len());
        for idx in 0..min_len {
            let left = &self.items[idx];
            let right = &other.items[idx];
            if left.py_eq(right, heap) {
                continue;
            }
            return left.py_cmp(right, heap);
        }
        self.items.len().partial_cmp(&other.items.len())
    }

    fn py_getitem(&self, idx: i64, heap: &Heap<impl AllocTracker>) -> RunResult<Value> {
        let normalized = normalize_index(idx, self.items.len());
        #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
        let len = self.items.len() as i64;
        if normalized < 0 || normalized >= len {
            return Err(ExcType::index_error_list_out_of_range());
        }
        #[expect(clippy::cast_sign_loss, reason = "index validated non-negative")]
        let pos = normalized as usize;
        Ok(self.items[pos].clone_with_heap(heap))
    }

    fn py_setitem(&mut self, idx: i64, value: Value, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        let normalized = normalize_index(idx, self.items.len());
        #[expect(clippy::cast_possible_wrap, reason = "sequence length fits in i64")]
        let len = self.items.len() as i64;
        if normalized < 0 || normalized >= len {
            value.drop_with_heap(heap);
            return Err(SimpleException::new_msg(ExcType::IndexError, "list assignment index out of range").into());
        }
        #[expect(clippy::cast_sign_loss, reason = "index validated non-negative")]
        let old = std::mem::replace(&mut self.items[normalized as usize], value);
        old.drop_with_heap(heap);
        Ok(())
    }

    fn py_clone(&self, heap: &Heap<impl AllocTracker>) -> Self {
        let items = self.items.iter().map(|item| item.clone_with_heap(heap)).collect();
        Self { items }
    }

    fn py_repr_fmt(
        &self,
        f: &mut impl std::fmt::Write,
        heap: &Heap<impl AllocTracker>,
        seen: &mut AHashSet<HeapId>,
    ) -> std::fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        for item in &self.items {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            item.py_repr_fmt(f, heap, seen)?;
        }
        f.write_str("]")
    }

    fn py_estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.items.capacity() * std::mem::size_of::<Value>()
    }

    fn py_dec_ref_ids(&self, stack: &mut RefStack) {
        for item in &self.items {
            if let Value::Ref(id) = item {
                stack.push(*id);
            }
        }
    }
}
