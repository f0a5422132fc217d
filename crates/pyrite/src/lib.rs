#![doc = include_str!("../../../README.md")]

mod exception;
mod heap;
mod types;
mod value;

pub use crate::{
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{
        AllocTracker, Heap, HeapDiff, HeapId, HeapStats, NoopTracker, SMALL_OBJECT_THRESHOLD, SizeClassTracker,
    },
    types::{List, ObjectProtocol, RefStack, Type, ValueIter},
    value::{DisplayValue, Value},
};
