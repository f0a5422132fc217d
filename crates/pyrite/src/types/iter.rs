//! Iteration over dynamic values.
//!
//! `ValueIter` uses index-based iteration (a cursor, not a borrowed Rust
//! iterator) so the heap stays accessible for cloning elements while the
//! iteration is in flight. Strings iterate by Unicode character with a byte
//! offset cursor for O(1) stepping; composites iterate by position through
//! their own contract.
//!
//! Iteration is restartable (a fresh iterator replays the same sequence) and
//! is a live view: mutating the underlying object between `for_next` calls is
//! visible, with no snapshot isolation.

use crate::{
    exception::{ExcType, RunResult},
    heap::{AllocTracker, Heap, HeapData, HeapId},
    value::Value,
};

/// Iteration state over a single value.
///
/// Holds a cloned handle for heap-backed targets so the object outlives the
/// iteration; callers must release the iterator with [`ValueIter::drop_with_heap`].
#[derive(Debug)]
pub struct ValueIter {
    kind: IterKind,
    /// The handle keeping a heap-backed iteration target alive.
    /// `Value::None` for string iteration, which copies its content up front.
    value: Value,
}

#[derive(Debug)]
enum IterKind {
    /// Character iteration over a copied string.
    Str { string: String, byte_offset: usize },
    /// Position-based iteration over a composite object.
    Seq { id: HeapId, index: usize },
}

impl ValueIter {
    /// Creates an iterator over `value`, or a TypeError if it is not iterable.
    pub(crate) fn new(value: &Value, heap: &Heap<impl AllocTracker>) -> RunResult<Self> {
        match value {
            Value::Str(s) => Ok(Self {
                kind: IterKind::Str {
                    string: s.clone(),
                    byte_offset: 0,
                },
                value: Value::None,
            }),
            Value::Ref(id) if heap.get(*id).py_iterable() => Ok(Self {
                kind: IterKind::Seq { id: *id, index: 0 },
                value: value.clone_with_heap(heap),
            }),
            other => Err(ExcType::type_error_not_iterable(other.py_type(heap))),
        }
    }

    /// Produces the next element, or `None` when exhausted.
    ///
    /// Returned elements are owned handles; the caller releases them.
    pub fn for_next(&mut self, heap: &Heap<impl AllocTracker>) -> Option<Value> {
        match &mut self.kind {
            IterKind::Str { string, byte_offset } => {
                let ch = string[*byte_offset..].chars().next()?;
                *byte_offset += ch.len_utf8();
                Some(Value::Str(ch.to_string()))
            }
            IterKind::Seq { id, index } => {
                let item = match heap.get(*id) {
                    HeapData::List(list) => list.items().get(*index)?.clone_with_heap(heap),
                };
                *index += 1;
                Some(item)
            }
        }
    }

    /// Releases the held target handle.
    pub fn drop_with_heap(self, heap: &mut Heap<impl AllocTracker>) {
        self.value.drop_with_heap(heap);
    }
}
