//! Tests for the heap model: reference-counted sharing, slot reuse,
//! size-class metrics, snapshots and serde round-trips.

use pretty_assertions::assert_eq;
use pyrite::{Heap, NoopTracker, Value};

// =============================================================================
// 1. Stats invariants
// =============================================================================

#[test]
fn fresh_heap_has_no_slots() {
    let heap = Heap::new();
    let stats = heap.stats();
    assert_eq!(stats.live_objects, 0);
    assert_eq!(stats.free_slots, 0);
    assert_eq!(stats.total_slots, 0);
}

#[test]
fn total_slots_invariant_holds_after_churn() {
    let mut heap = Heap::new();
    let a = heap.new_list(vec![Value::Int(1)]);
    let b = heap.new_list(vec![]);
    a.drop_with_heap(&mut heap);
    let stats = heap.stats();
    assert_eq!(
        stats.total_slots,
        stats.live_objects + stats.free_slots,
        "total_slots must equal live + free"
    );
    b.drop_with_heap(&mut heap);
}

#[test]
fn objects_by_type_counts_lists() {
    let mut heap = Heap::new();
    let a = heap.new_list(vec![]);
    let b = heap.new_list(vec![]);
    let stats = heap.stats();
    assert_eq!(stats.objects_by_type.get("List"), Some(&2));
    b.drop_with_heap(&mut heap);
    a.drop_with_heap(&mut heap);
}

#[test]
fn stats_are_deterministic() {
    let mut heap = Heap::new();
    let list = heap.new_list(vec![Value::Int(1)]);
    assert_eq!(heap.stats(), heap.stats());
    list.drop_with_heap(&mut heap);
}

// =============================================================================
// 2. Slot reuse
// =============================================================================

#[test]
fn released_slots_are_recycled() {
    let mut heap = Heap::new();
    for _ in 0..100 {
        let list = heap.new_list(vec![Value::Int(1)]);
        list.drop_with_heap(&mut heap);
    }
    assert_eq!(
        heap.stats().total_slots,
        1,
        "repeated allocate/release must reuse the same slot"
    );
}

// =============================================================================
// 3. Shared ownership
// =============================================================================

#[test]
fn clones_share_the_referenced_object() {
    let mut heap = Heap::new();
    let a = heap.new_list(vec![Value::Int(1)]);
    let b = a.clone_with_heap(&heap);
    // mutation through one handle is visible through the other
    a.append(Value::Int(2), &mut heap).unwrap();
    assert_eq!(b.repr(&heap), "[1, 2]");

    a.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 1, "object outlives the first holder");
    b.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0, "last release frees the object");
}

#[test]
fn ref_count_tracks_holders() {
    let mut heap = Heap::new();
    let a = heap.new_list(vec![]);
    let Value::Ref(id) = &a else { panic!("new_list must return a Ref") };
    let id = *id;
    assert_eq!(heap.ref_count(id), 1);
    let b = a.clone_with_heap(&heap);
    assert_eq!(heap.ref_count(id), 2);
    b.drop_with_heap(&mut heap);
    assert_eq!(heap.ref_count(id), 1);
    a.drop_with_heap(&mut heap);
}

#[test]
fn nested_teardown_releases_children() {
    let mut heap = Heap::new();
    let inner = heap.new_list(vec![Value::Int(1)]);
    let middle = heap.new_list(vec![inner]);
    let outer = heap.new_list(vec![middle]);
    assert_eq!(heap.stats().live_objects, 3);
    outer.drop_with_heap(&mut heap);
    assert_eq!(heap.stats().live_objects, 0, "dropping the root must free the chain");
}

#[test]
fn self_referential_cycles_are_not_reclaimed() {
    let mut heap = Heap::new();
    let list = heap.new_list(vec![]);
    let alias = list.clone_with_heap(&heap);
    list.append(alias, &mut heap).unwrap();
    list.drop_with_heap(&mut heap);
    // reference counting alone cannot collect the cycle; the embedder must
    // break cycles before releasing the last external handle
    assert_eq!(heap.stats().live_objects, 1);
}

// =============================================================================
// 4. Size-class metrics
// =============================================================================

#[test]
fn small_and_large_allocations_are_classified() {
    let mut heap = Heap::new();
    let before = heap.stats();

    let small = heap.new_list(vec![]);
    let after_small = heap.stats();
    assert_eq!(
        after_small.small_allocations,
        before.small_allocations.map(|n| n + 1),
        "an empty list is a small allocation"
    );

    let large = heap.new_list((0..32).map(Value::Int).collect());
    let after_large = heap.stats();
    assert_eq!(
        after_large.large_allocations,
        after_small.large_allocations.map(|n| n + 1),
        "a 32-element list exceeds the small-object threshold"
    );

    large.drop_with_heap(&mut heap);
    small.drop_with_heap(&mut heap);
    let end = heap.stats();
    assert_eq!(end.freed_objects, Some(2));
}

#[test]
fn noop_tracker_records_nothing() {
    let mut heap = Heap::with_tracker(NoopTracker);
    let list = heap.new_list(vec![Value::Int(1)]);
    let stats = heap.stats();
    assert_eq!(stats.small_allocations, None);
    assert_eq!(stats.large_allocations, None);
    assert_eq!(stats.freed_objects, None);
    list.drop_with_heap(&mut heap);
}

// =============================================================================
// 5. Swap
// =============================================================================

#[test]
fn swap_data_is_visible_through_existing_handles() {
    let mut heap = Heap::new();
    let a = heap.new_list(vec![Value::Int(1)]);
    let b = heap.new_list(vec![Value::Int(2), Value::Int(3)]);
    let (Value::Ref(a_id), Value::Ref(b_id)) = (&a, &b) else {
        panic!("new_list must return Refs")
    };
    heap.swap_data(*a_id, *b_id);
    assert_eq!(a.repr(&heap), "[2, 3]");
    assert_eq!(b.repr(&heap), "[1]");
    b.drop_with_heap(&mut heap);
    a.drop_with_heap(&mut heap);
}

// =============================================================================
// 6. Diffs
// =============================================================================

#[test]
fn diff_between_identical_snapshots_is_empty() {
    let mut heap = Heap::new();
    let list = heap.new_list(vec![Value::Int(1)]);
    let stats = heap.stats();
    assert!(stats.diff(&stats).is_empty());
    assert_eq!(stats.diff(&stats).to_string(), "HeapDiff: no changes");
    list.drop_with_heap(&mut heap);
}

#[test]
fn diff_reports_per_type_growth() {
    let mut heap = Heap::new();
    let before = heap.stats();
    let a = heap.new_list(vec![]);
    let b = heap.new_list(vec![]);
    let diff = before.diff(&heap.stats());
    assert_eq!(diff.live_objects_delta, 2);
    assert_eq!(diff.objects_by_type_delta.get("List"), Some(&2));
    assert_eq!(diff.new_types, vec!["List"]);
    b.drop_with_heap(&mut heap);
    a.drop_with_heap(&mut heap);
}

// =============================================================================
// 7. Serde round-trip
// =============================================================================

#[test]
fn heap_and_handles_round_trip_through_serde() {
    let mut heap = Heap::new();
    let inner = heap.new_list(vec![Value::Int(9)]);
    let list = heap.new_list(vec![Value::Int(1), Value::Str("two".to_string()), inner]);

    let heap_json = serde_json::to_string(&heap).unwrap();
    let list_json = serde_json::to_string(&list).unwrap();
    let mut restored_heap: Heap = serde_json::from_str(&heap_json).unwrap();
    let restored_list: Value = serde_json::from_str(&list_json).unwrap();

    assert_eq!(restored_list.repr(&restored_heap), "[1, 'two', [9]]");
    assert_eq!(restored_heap.stats(), heap.stats());

    // the restored heap is fully functional
    restored_list.append(Value::Int(3), &mut restored_heap).unwrap();
    assert_eq!(restored_list.repr(&restored_heap), "[1, 'two', [9], 3]");

    restored_list.drop_with_heap(&mut restored_heap);
    list.drop_with_heap(&mut heap);
}
