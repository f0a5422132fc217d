//! The uniform tagged handle every embedder holds.
//!
//! A [`Value`] is either a primitive scalar stored inline (bool, int, float,
//! complex, string, the null value) or a reference to a heap-allocated
//! composite object. All Python-level operations dispatch through the handle:
//! primitives are handled locally, composite operations forward to the
//! referenced object's variant.

use std::{cmp::Ordering, fmt, mem::discriminant};

use ahash::AHashSet;

use crate::{
    exception::{ExcType, RunResult},
    heap::{AllocTracker, Heap, HeapData, HeapId},
    types::{
        ObjectProtocol, Type, ValueIter,
        str::{get_char_at_index, get_str_slice, string_repr_fmt},
    },
};

/// Primary value type representing runtime objects.
///
/// Primitive scalars are stored inline; composite values live in the heap
/// arena and are shared via `Ref(HeapId)` with reference-counted lifetime.
///
/// NOTE: `Clone` is intentionally NOT derived. Use `clone_with_heap()` for a
/// counted copy or `clone_immediate()` for primitives only. A derived clone
/// of a `Ref` would bypass reference counting.
///
/// The derived `PartialEq` is Rust-level identity equality (`Ref` compares
/// slot ids); Python structural equality is [`Value::py_eq`].
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// The null value.
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A complex number with 64-bit components.
    Complex { real: f64, imag: f64 },
    /// A string scalar, held by value: copies of the handle copy the string.
    Str(String),
    /// Reference to a heap-allocated composite object.
    Ref(HeapId),
    /// Sentinel indicating this Value was properly cleaned up via `drop_with_heap`.
    /// Only exists when `ref-count-panic` is enabled; used to verify reference
    /// counting correctness in tests.
    #[cfg(feature = "ref-count-panic")]
    Dereferenced,
}

/// Drop implementation that panics if a `Ref` variant is dropped without
/// calling `drop_with_heap`. Helps catch reference counting bugs during
/// development; only enabled with the `ref-count-panic` feature.
#[cfg(feature = "ref-count-panic")]
impl Drop for Value {
    fn drop(&mut self) {
        if let Self::Ref(id) = self {
            panic!("Value::Ref({id:?}) dropped without calling drop_with_heap() - this is a reference counting bug");
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl Value {
    /// The type-identity token of the active variant.
    ///
    /// For `Ref` values this is the referenced object's runtime type.
    #[must_use]
    pub fn py_type(&self, heap: &Heap<impl AllocTracker>) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Complex { .. } => Type::Complex,
            Self::Str(_) => Type::Str,
            Self::Ref(id) => heap.get(*id).py_type(),
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot access Dereferenced object"),
        }
    }

    /// Number of elements for sequence values (strings count characters);
    /// `None` for non-sequence primitives.
    #[must_use]
    pub fn py_len(&self, heap: &Heap<impl AllocTracker>) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.chars().count()),
            Self::Ref(id) => Some(heap.get(*id).py_len()),
            _ => None,
        }
    }

    /// Structural equality.
    ///
    /// Tokens are compared first: values of different kinds are never equal,
    /// including int vs. float and bool vs. int. Composite values compare
    /// structurally through their variant's contract, with a fast path for
    /// identical references.
    #[must_use]
    pub fn py_eq(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> bool {
        if discriminant(self) != discriminant(other) {
            return false;
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (
                Self::Complex { real: r1, imag: i1 },
                Self::Complex { real: r2, imag: i2 },
            ) => r1 == r2 && i1 == i2,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b || heap.get(*a).py_eq(heap.get(*b), heap),
            _ => false,
        }
    }

    /// Total-order attempt used by `sort`.
    ///
    /// Only values of the same kind are comparable: bools, ints, strings and
    /// lists by their natural orders, floats by `total_cmp`, `None` equal to
    /// `None`. Complex values and cross-kind pairs are not ordered.
    #[must_use]
    pub fn py_cmp(&self, other: &Self, heap: &Heap<impl AllocTracker>) -> Option<Ordering> {
        match (self, other) {
            (Self::None, Self::None) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Ref(a), Self::Ref(b)) => heap.get(*a).py_cmp(heap.get(*b), heap),
            _ => None,
        }
    }

    /// Indexed read.
    ///
    /// Strings return the character at the (possibly negative) offset as a
    /// one-character string; composite iterables forward to the object.
    pub fn get_item(&self, idx: i64, heap: &Heap<impl AllocTracker>) -> RunResult<Self> {
        match self {
            Self::Str(s) => get_char_at_index(s, idx),
            Self::Ref(id) if heap.get(*id).py_iterable() => heap.get(*id).py_getitem(idx, heap),
            other => Err(ExcType::type_error_not_subscriptable(other.py_type(heap))),
        }
    }

    /// Indexed write. Takes ownership of `value`, releasing it on failure.
    pub fn set_item(&self, idx: i64, value: Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        match self {
            Self::Ref(id) => heap.with_data_mut(*id, |data, heap| match data {
                HeapData::List(list) => list.py_setitem(idx, value, heap),
            }),
            other => {
                let err = ExcType::type_error_no_item_assignment(other.py_type(heap));
                value.drop_with_heap(heap);
                Err(err)
            }
        }
    }

    /// Appends `x` at the end of a composite sequence. Takes ownership of `item`.
    pub fn append(&self, item: Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        match self {
            Self::Ref(id) => {
                heap.with_data_mut(*id, |data, _heap| match data {
                    HeapData::List(list) => list.push(item),
                });
                Ok(())
            }
            other => {
                let err = ExcType::type_error_no_attribute(other.py_type(heap), "append");
                item.drop_with_heap(heap);
                Err(err)
            }
        }
    }

    /// Inserts `item` before the element currently at `idx`.
    pub fn insert(&self, idx: i64, item: Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        match self {
            Self::Ref(id) => heap.with_data_mut(*id, |data, heap| match data {
                HeapData::List(list) => list.insert(idx, item, heap),
            }),
            other => {
                let err = ExcType::type_error_no_attribute(other.py_type(heap), "insert");
                item.drop_with_heap(heap);
                Err(err)
            }
        }
    }

    /// Removes and returns the element at `idx` (default last is `-1`).
    /// The returned handle is owned by the caller.
    pub fn pop(&self, idx: i64, heap: &mut Heap<impl AllocTracker>) -> RunResult<Self> {
        match self {
            Self::Ref(id) => heap.with_data_mut(*id, |data, _heap| match data {
                HeapData::List(list) => list.pop(idx),
            }),
            other => Err(ExcType::type_error_no_attribute(other.py_type(heap), "pop")),
        }
    }

    /// Removes the first element equal to `target` (value equality, not identity).
    pub fn remove(&self, target: &Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        let Self::Ref(id) = self else {
            return Err(ExcType::type_error_no_attribute(self.py_type(heap), "remove"));
        };
        let pos = match heap.get(*id) {
            HeapData::List(list) => list.position(target, heap),
        };
        let Some(pos) = pos else {
            return Err(ExcType::value_error("list.remove(x): x not in list"));
        };
        let removed = heap.with_data_mut(*id, |data, _heap| match data {
            HeapData::List(list) => list.remove_at(pos),
        });
        removed.drop_with_heap(heap);
        Ok(())
    }

    /// Position of the first element equal to `target`.
    pub fn index_of(&self, target: &Self, heap: &Heap<impl AllocTracker>) -> RunResult<i64> {
        match self {
            Self::Ref(id) => match heap.get(*id) {
                HeapData::List(list) => list.index_of(target, heap),
            },
            other => Err(ExcType::type_error_no_attribute(other.py_type(heap), "index")),
        }
    }

    /// Number of elements equal to `target`. Never fails on sequences.
    pub fn count(&self, target: &Self, heap: &Heap<impl AllocTracker>) -> RunResult<i64> {
        match self {
            Self::Ref(id) => match heap.get(*id) {
                HeapData::List(list) => Ok(list.count(target, heap)),
            },
            other => Err(ExcType::type_error_no_attribute(other.py_type(heap), "count")),
        }
    }

    /// Appends every element produced by iterating `iterable`, in order.
    ///
    /// All-or-nothing: the source is materialized before any mutation, so a
    /// non-iterable operand fails without touching the sequence. Extending a
    /// list with itself therefore works (the snapshot is taken first).
    pub fn extend(&self, iterable: &Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        let Self::Ref(id) = self else {
            return Err(ExcType::type_error_no_attribute(self.py_type(heap), "extend"));
        };
        let mut iter = ValueIter::new(iterable, heap)?;
        let mut items = Vec::new();
        while let Some(item) = iter.for_next(heap) {
            items.push(item);
        }
        iter.drop_with_heap(heap);
        heap.with_data_mut(*id, |data, _heap| match data {
            HeapData::List(list) => list.extend_with(items),
        });
        Ok(())
    }

    /// Removes all elements of a composite sequence, or clears a string in
    /// place. Clearing a string affects only this handle (strings are held
    /// by value).
    pub fn clear(&mut self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        match self {
            Self::Str(s) => {
                s.clear();
                Ok(())
            }
            Self::Ref(id) => {
                heap.with_data_mut(*id, |data, heap| match data {
                    HeapData::List(list) => list.clear(heap),
                });
                Ok(())
            }
            other => Err(ExcType::type_error_no_attribute(other.py_type(heap), "clear")),
        }
    }

    /// Copies this value: primitives by value, composites as a shallow copy
    /// (new container identity, shared element handles).
    #[must_use]
    pub fn copy(&self, heap: &mut Heap<impl AllocTracker>) -> Self {
        match self {
            Self::Ref(id) => {
                let cloned = heap.get(*id).py_clone(heap);
                Self::Ref(heap.allocate(cloned))
            }
            other => other.clone_immediate(),
        }
    }

    /// Selects the elements (characters for strings) at `start, start + step,
    /// …` strictly before `stop`, after normalizing both bounds.
    ///
    /// Returns a new value of the same kind; the original is unchanged.
    pub fn slice(&self, start: i64, stop: i64, step: i64, heap: &mut Heap<impl AllocTracker>) -> RunResult<Self> {
        crate::types::list::check_slice_step(step)?;
        match self {
            Self::Str(s) => get_str_slice(s, start, stop, step),
            Self::Ref(id) if heap.get(*id).py_iterable() => {
                let data = match heap.get(*id) {
                    HeapData::List(list) => HeapData::List(list.slice(start, stop, step, heap)?),
                };
                Ok(Self::Ref(heap.allocate(data)))
            }
            other => Err(ExcType::type_error_not_subscriptable(other.py_type(heap))),
        }
    }

    /// Reverses a composite sequence in place.
    pub fn reverse(&self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        match self {
            Self::Ref(id) => {
                heap.with_data_mut(*id, |data, _heap| match data {
                    HeapData::List(list) => list.reverse(),
                });
                Ok(())
            }
            other => Err(ExcType::type_error_no_attribute(other.py_type(heap), "reverse")),
        }
    }

    /// Stable in-place sort of a composite sequence.
    ///
    /// An incomparable element pair raises TypeError and leaves the sequence
    /// unchanged.
    pub fn sort(&self, heap: &mut Heap<impl AllocTracker>) -> RunResult<()> {
        let Self::Ref(id) = self else {
            return Err(ExcType::type_error_no_attribute(self.py_type(heap), "sort"));
        };
        let order = match heap.get(*id) {
            HeapData::List(list) => list.sorted_order(heap)?,
        };
        heap.with_data_mut(*id, |data, _heap| match data {
            HeapData::List(list) => list.apply_order(order),
        });
        Ok(())
    }

    /// Concatenation: a new sequence with this sequence's elements followed
    /// by `other`'s. Both operands must be the same composite variant;
    /// neither input is mutated.
    pub fn concat(&self, other: &Self, heap: &mut Heap<impl AllocTracker>) -> RunResult<Self> {
        match (self, other) {
            (Self::Ref(a), Self::Ref(b)) => {
                let data = match (heap.get(*a), heap.get(*b)) {
                    (HeapData::List(left), HeapData::List(right)) => HeapData::List(left.concat(right, heap)),
                };
                Ok(Self::Ref(heap.allocate(data)))
            }
            (Self::Ref(_), not_list) => Err(ExcType::type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                not_list.py_type(heap)
            ))),
            _ => Err(ExcType::type_error(format!(
                "unsupported operand type(s) for +: '{}' and '{}'",
                self.py_type(heap),
                other.py_type(heap)
            ))),
        }
    }

    /// Creates an iterator over this value: strings by character, composites
    /// by their own contract. Fails with TypeError for other primitives.
    pub fn iter(&self, heap: &Heap<impl AllocTracker>) -> RunResult<ValueIter> {
        ValueIter::new(self, heap)
    }

    /// The repr form as an owned string.
    #[must_use]
    pub fn repr(&self, heap: &Heap<impl AllocTracker>) -> String {
        let mut out = String::new();
        let mut seen = AHashSet::new();
        self.py_repr_fmt(&mut out, heap, &mut seen)
            .expect("formatting to a String cannot fail");
        out
    }

    /// Returns an adapter implementing `Display` with the str form: strings
    /// print their content unquoted, everything else uses the repr form.
    #[must_use]
    pub fn display<'a, T: AllocTracker>(&'a self, heap: &'a Heap<T>) -> DisplayValue<'a, T> {
        DisplayValue { value: self, heap }
    }

    /// Writes the repr form. `seen` holds the heap ids currently being
    /// formatted so reference cycles render as `[...]`.
    pub(crate) fn py_repr_fmt(
        &self,
        f: &mut impl fmt::Write,
        heap: &Heap<impl AllocTracker>,
        seen: &mut AHashSet<HeapId>,
    ) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Complex { real, imag } => complex_repr_fmt(*real, *imag, f),
            Self::Str(s) => string_repr_fmt(s, f),
            Self::Ref(id) => {
                if seen.contains(id) {
                    return f.write_str("[...]");
                }
                seen.insert(*id);
                let result = heap.get(*id).py_repr_fmt(f, heap, seen);
                seen.remove(id);
                result
            }
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot access Dereferenced object"),
        }
    }

    /// Clones a value with proper heap reference counting.
    ///
    /// Primitives are copied; `Ref` values get their reference count bumped
    /// and share the same object.
    #[must_use]
    pub fn clone_with_heap(&self, heap: &Heap<impl AllocTracker>) -> Self {
        match self {
            Self::Ref(id) => {
                heap.inc_ref(*id);
                Self::Ref(*id)
            }
            other => other.clone_immediate(),
        }
    }

    /// Copies a primitive value without heap interaction.
    ///
    /// # Panics
    /// Panics on `Ref` values; those must go through `clone_with_heap` to
    /// maintain refcounts.
    #[must_use]
    pub fn clone_immediate(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Bool(v) => Self::Bool(*v),
            Self::Int(v) => Self::Int(*v),
            Self::Float(v) => Self::Float(*v),
            Self::Complex { real, imag } => Self::Complex {
                real: *real,
                imag: *imag,
            },
            Self::Str(s) => Self::Str(s.clone()),
            Self::Ref(_) => panic!("Ref clones must go through clone_with_heap to maintain refcounts"),
            #[cfg(feature = "ref-count-panic")]
            Self::Dereferenced => panic!("Cannot clone Dereferenced object"),
        }
    }

    /// Drops a value, decrementing its heap reference count if applicable.
    ///
    /// For primitives this is a no-op. For `Ref` values this releases one
    /// reference; the object (and its children) is freed when the count
    /// reaches zero.
    #[cfg(not(feature = "ref-count-panic"))]
    #[inline]
    pub fn drop_with_heap(self, heap: &mut Heap<impl AllocTracker>) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    /// With `ref-count-panic` enabled, `Ref` variants are replaced with
    /// `Dereferenced` and forgotten so the Drop impl does not fire.
    #[cfg(feature = "ref-count-panic")]
    pub fn drop_with_heap(mut self, heap: &mut Heap<impl AllocTracker>) {
        let old = std::mem::replace(&mut self, Self::Dereferenced);
        if let Self::Ref(id) = &old {
            heap.dec_ref(*id);
            std::mem::forget(old);
        }
    }
}

/// `Display` adapter returned by [`Value::display`].
pub struct DisplayValue<'a, T: AllocTracker> {
    value: &'a Value,
    heap: &'a Heap<T>,
}

impl<T: AllocTracker> fmt::Display for DisplayValue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Str(s) => f.write_str(s),
            other => {
                let mut seen = AHashSet::new();
                other.py_repr_fmt(f, self.heap, &mut seen)
            }
        }
    }
}

/// Returns a string representation of a float matching Python's `repr()`.
///
/// Uses the `ryu` crate for the shortest decimal representation that
/// round-trips through `f64` parsing. Special values print as `inf`,
/// `-inf` and `nan`; integral floats keep a `.0` suffix.
fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_negative() {
            "-inf".to_string()
        } else {
            "inf".to_string()
        };
    }

    let mut buffer = ryu::Buffer::new();
    let s = buffer.format(f);
    fix_ryu_exponent(s)
}

/// Fixes ryu's exponent format to match Python.
///
/// ryu produces "1e20" but Python uses "1e+20" for positive exponents.
/// Also ensures a ".0" suffix for outputs without a decimal point.
fn fix_ryu_exponent(s: &str) -> String {
    if let Some(e_pos) = s.find('e') {
        let (mantissa, exp_part) = s.split_at(e_pos);
        let exp = &exp_part[1..];
        if !exp.starts_with('-') {
            return format!("{mantissa}e+{exp}");
        }
        return s.to_string();
    }
    if !s.contains('.') {
        return format!("{s}.0");
    }
    s.to_string()
}

/// Writes the repr form of a complex value: `2j`, `(1+2j)`, `(1.5-2j)`.
fn complex_repr_fmt(real: f64, imag: f64, f: &mut impl fmt::Write) -> fmt::Result {
    if real == 0.0 && real.is_sign_positive() {
        return write!(f, "{}j", complex_part(imag));
    }
    let (sign, imag_abs) = if imag.is_sign_negative() && !imag.is_nan() {
        ('-', -imag)
    } else {
        ('+', imag)
    };
    write!(f, "({}{sign}{}j)", complex_part(real), complex_part(imag_abs))
}

/// Formats one component of a complex repr: integral components print
/// without a decimal point, matching Python (`(1+2j)`, not `(1.0+2.0j)`).
fn complex_part(v: f64) -> String {
    if v == 0.0 {
        return if v.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        #[expect(clippy::cast_possible_truncation, reason = "integral magnitude checked above")]
        return format!("{}", v as i64);
    }
    float_repr(v)
}
