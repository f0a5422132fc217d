use std::{cmp::Ordering, fmt::Write};

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    exception::RunResult,
    heap::{AllocTracker, Heap, HeapId},
    types::Type,
    value::Value,
};

/// Work stack for collecting child heap references during teardown.
///
/// Most containers hold only a handful of references, so the ids stay inline.
pub type RefStack = SmallVec<[HeapId; 8]>;

/// Capability contract every composite (heap-allocated) variant implements.
///
/// `HeapData` dispatches each method to its active variant by exhaustive
/// match, so adding a variant extends every operation at compile time.
///
/// Heap access conventions: read-only operations take `&Heap` (cloning a
/// value only bumps a refcount, which uses interior mutability), while
/// operations that release or allocate values take `&mut Heap`.
pub trait ObjectProtocol {
    /// The type-identity token of this variant.
    fn py_type(&self) -> Type;

    /// Number of elements.
    fn py_len(&self) -> usize;

    /// Whether the variant supports indexed access and iteration.
    fn py_iterable(&self) -> bool;

    /// Structural equality against another instance of the same variant.
    fn py_eq(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> bool;

    /// Total-order attempt; `None` when the operands are not comparable.
    fn py_cmp(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> Option<Ordering>;

    /// Indexed read. `idx` may be negative (normalized against the length).
    fn py_getitem(&self, idx: i64, heap: &Heap<impl AllocTracker>) -> RunResult<Value>;

    /// Indexed write. Releases the replaced element; releases `value` on failure.
    fn py_setitem(&mut self, idx: i64, value: Value, heap: &mut Heap<impl AllocTracker>) -> RunResult<()>;

    /// Shallow clone: new container identity, shared element handles.
    #[must_use]
    fn py_clone(&self, heap: &Heap<impl AllocTracker>) -> Self
    where
        Self: Sized;

    /// Writes the repr form. `seen` carries the ids currently being formatted
    /// so reference cycles render as `[...]` instead of recursing forever.
    fn py_repr_fmt(
        &self,
        f: &mut impl Write,
        heap: &Heap<impl AllocTracker>,
        seen: &mut AHashSet<HeapId>,
    ) -> std::fmt::Result;

    /// Estimated payload size in bytes, used for allocation size-classing.
    fn py_estimate_size(&self) -> usize;

    /// Pushes the heap ids of directly held children onto `stack`.
    fn py_dec_ref_ids(&self, stack: &mut RefStack);
}
