//! Tests for slice semantics on lists and strings: normalization, the
//! `start >= stop` empty rule, stride traversal and bound checks.

use pyrite::{ExcType, Heap, Value};

fn int_list(heap: &mut Heap, items: &[i64]) -> Value {
    let items = items.iter().map(|&v| Value::Int(v)).collect();
    heap.new_list(items)
}

// =============================================================================
// 1. Slice laws
// =============================================================================

#[test]
fn full_slice_is_an_equal_value_with_distinct_identity() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[1, 2, 3, 4]);
    let full = list.slice(0, 4, 1, &mut heap).unwrap();
    assert!(full.py_eq(&list, &heap), "slice(0, L, 1) equals the original by value");
    assert_ne!(full, list, "but is a distinct container");
    // mutating the slice leaves the original untouched
    full.append(Value::Int(5), &mut heap).unwrap();
    assert_eq!(list.repr(&heap), "[1, 2, 3, 4]");
    full.drop_with_heap(&mut heap);
    list.drop_with_heap(&mut heap);
}

#[test]
fn negative_bounds_normalize_against_length() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[0, 1, 2, 3, 4]);
    // -4 -> 1, -1 -> 4
    let sliced = list.slice(-4, -1, 1, &mut heap).unwrap();
    assert_eq!(sliced.repr(&heap), "[1, 2, 3]");
    sliced.drop_with_heap(&mut heap);
    list.drop_with_heap(&mut heap);
}

#[test]
fn start_at_or_past_stop_selects_nothing() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[1, 2, 3]);
    for (start, stop) in [(2, 2), (3, 1), (-1, 1)] {
        let sliced = list.slice(start, stop, 1, &mut heap).unwrap();
        assert_eq!(sliced.repr(&heap), "[]", "slice({start}, {stop}) should be empty");
        sliced.drop_with_heap(&mut heap);
    }
    list.drop_with_heap(&mut heap);
}

#[test]
fn stride_walks_every_step_th_position() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[0, 1, 2, 3, 4, 5, 6]);
    let sliced = list.slice(1, 6, 2, &mut heap).unwrap();
    assert_eq!(sliced.repr(&heap), "[1, 3, 5]");
    let sliced3 = list.slice(0, 7, 3, &mut heap).unwrap();
    assert_eq!(sliced3.repr(&heap), "[0, 3, 6]");
    sliced3.drop_with_heap(&mut heap);
    sliced.drop_with_heap(&mut heap);
    list.drop_with_heap(&mut heap);
}

#[test]
fn out_of_range_bounds_are_index_errors() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[1, 2, 3]);
    let err = list.slice(0, 9, 1, &mut heap).unwrap_err();
    assert!(err.is_exception_type(ExcType::IndexError), "got {err}");
    let err = list.slice(-9, 2, 1, &mut heap).unwrap_err();
    assert!(err.is_exception_type(ExcType::IndexError), "got {err}");
    list.drop_with_heap(&mut heap);
}

#[test]
fn zero_or_negative_step_is_value_error() {
    let mut heap = Heap::new();
    let list = int_list(&mut heap, &[1, 2, 3]);
    let err = list.slice(0, 3, 0, &mut heap).unwrap_err();
    assert_eq!(err.to_string(), "ValueError: slice step cannot be zero");
    let err = list.slice(0, 3, -1, &mut heap).unwrap_err();
    assert!(err.is_exception_type(ExcType::ValueError), "got {err}");
    list.drop_with_heap(&mut heap);
}

#[test]
fn sliced_elements_are_shared_handles() {
    let mut heap = Heap::new();
    let inner = heap.new_list(vec![Value::Int(9)]);
    let list = heap.new_list(vec![inner]);
    let sliced = list.slice(0, 1, 1, &mut heap).unwrap();
    // the slice shares the inner list, so mutation is visible through both
    let shared = sliced.get_item(0, &heap).unwrap();
    shared.append(Value::Int(10), &mut heap).unwrap();
    assert_eq!(list.repr(&heap), "[[9, 10]]");
    shared.drop_with_heap(&mut heap);
    sliced.drop_with_heap(&mut heap);
    list.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0);
}

// =============================================================================
// 2. String slices
// =============================================================================

#[test]
fn string_slices_select_characters() {
    let mut heap = Heap::new();
    let s = Value::Str("abcdef".to_string());
    assert_eq!(s.slice(1, 4, 1, &mut heap).unwrap(), Value::Str("bcd".to_string()));
    assert_eq!(s.slice(0, 6, 2, &mut heap).unwrap(), Value::Str("ace".to_string()));
    assert_eq!(s.slice(-3, -1, 1, &mut heap).unwrap(), Value::Str("de".to_string()));
    assert_eq!(s.slice(4, 2, 1, &mut heap).unwrap(), Value::Str(String::new()));
}

#[test]
fn string_slices_handle_multibyte_characters() {
    let mut heap = Heap::new();
    let s = Value::Str("añob".to_string());
    assert_eq!(s.slice(1, 3, 1, &mut heap).unwrap(), Value::Str("ño".to_string()));
}

#[test]
fn slicing_a_non_sequence_is_type_error() {
    let mut heap = Heap::new();
    let err = Value::Int(5).slice(0, 1, 1, &mut heap).unwrap_err();
    assert!(err.is_exception_type(ExcType::TypeError), "got {err}");
}
