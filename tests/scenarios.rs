use fit_allocator::{AllocError, Allocator, Handle, Strategy, SystemArena};

use test_log::test;

fn new(total_size: usize, strategy: Strategy) -> Allocator<SystemArena> {
    let mut allocator = Allocator::new(SystemArena);
    allocator.init(total_size, strategy).unwrap();
    allocator
}

// (start, size, is_hole) for every region, in order
fn layout(allocator: &Allocator<SystemArena>) -> Vec<(usize, usize, bool)> {
    allocator
        .regions()
        .iter()
        .map(|r| (r.start(), r.size(), r.is_hole()))
        .collect()
}

fn assert_valid(allocator: &Allocator<SystemArena>) {
    let (validity, _) = allocator.stats();
    assert!(validity.is_valid(), "{:?}: {}", validity, allocator.regions());
}

// Holes of 52 and 32 bytes, separated and followed by allocations:
// Hole(0, 52), Allocated(52, 4), Hole(56, 32), Allocated(88, 112)
fn two_holes(strategy: Strategy) -> (Allocator<SystemArena>, Handle, Handle) {
    let mut allocator = new(200, strategy);
    let a = allocator.alloc(50).unwrap();
    let b = allocator.alloc(4).unwrap();
    let c = allocator.alloc(30).unwrap();
    let d = allocator.alloc(112).unwrap();
    assert_eq!(allocator.size(), 4);

    allocator.free(a);
    allocator.free(c);
    assert_eq!(
        layout(&allocator),
        vec![(0, 52, true), (52, 4, false), (56, 32, true), (88, 112, false)]
    );
    (allocator, b, d)
}

#[test]
fn scenario_a_alloc_then_free() {
    let mut allocator = new(1024, Strategy::FirstFit);

    let handle = allocator.alloc(100).unwrap();
    assert_eq!(allocator.size(), 2);
    assert_eq!(layout(&allocator), vec![(0, 100, false), (100, 924, true)]);

    allocator.free(handle);
    assert_eq!(allocator.size(), 1);
    assert_eq!(layout(&allocator), vec![(0, 1024, true)]);
}

#[test]
fn scenario_b_best_fit_prefers_smaller_leftover() {
    let (mut allocator, _b, _d) = two_holes(Strategy::BestFit);

    let handle = allocator.alloc(20).unwrap();
    assert_eq!(handle.offset(), 56);
    assert_eq!(
        layout(&allocator),
        vec![
            (0, 52, true),
            (52, 4, false),
            (56, 20, false),
            (76, 12, true),
            (88, 112, false)
        ]
    );
    assert_valid(&allocator);
}

#[test]
fn strategies_pick_different_holes() {
    let (mut first, _, _) = two_holes(Strategy::FirstFit);
    assert_eq!(first.alloc(20).unwrap().offset(), 0);

    let (mut worst, _, _) = two_holes(Strategy::WorstFit);
    assert_eq!(worst.alloc(20).unwrap().offset(), 0);
    // Now the holes are 32 (at 20) and 32 (at 56): the tie goes to the lower one
    assert_eq!(worst.alloc(8).unwrap().offset(), 20);

    let (mut best, _, _) = two_holes(Strategy::BestFit);
    // An exact fit beats everything
    assert_eq!(best.alloc(32).unwrap().offset(), 56);
    assert_eq!(best.size(), 4);
}

#[test]
fn scenario_c_next_fit_resumes_after_previous() {
    let mut allocator = new(300, Strategy::NextFit);

    let first = allocator.alloc(50).unwrap();
    let second = allocator.alloc(50).unwrap();
    assert_eq!((first.offset(), second.offset()), (0, 52));

    allocator.free(first);
    let third = allocator.alloc(40).unwrap();

    // First-fit would have reused offset 0
    assert_eq!(third.offset(), 104);
    assert_eq!(
        layout(&allocator),
        vec![(0, 52, true), (52, 52, false), (104, 40, false), (144, 156, true)]
    );
    assert_valid(&allocator);
}

#[test]
fn next_fit_wraps_around() {
    let mut allocator = new(64, Strategy::NextFit);
    let a = allocator.alloc(16).unwrap();
    let _b = allocator.alloc(16).unwrap();
    let c = allocator.alloc(32).unwrap();
    assert_eq!(c.offset(), 32);

    allocator.free(a);
    // Nothing after offset 32, so the search starts over from the front
    assert_eq!(allocator.alloc(8).unwrap().offset(), 0);
}

#[test]
fn next_fit_falls_back_when_cursor_is_gone() {
    let mut allocator = new(64, Strategy::NextFit);
    let _a = allocator.alloc(16).unwrap();
    let b = allocator.alloc(16).unwrap();
    let c = allocator.alloc(16).unwrap();

    allocator.free(b);
    // The previous allocation merges into the hole at 16 and disappears
    allocator.free(c);
    assert_eq!(layout(&allocator), vec![(0, 16, false), (16, 48, true)]);

    assert_eq!(allocator.alloc(4).unwrap().offset(), 16);
    assert_valid(&allocator);
}

#[test]
fn scenario_d_exhaustion_leaves_list_unchanged() {
    for &strategy in Strategy::ALL.iter() {
        let mut allocator = new(256, strategy);
        let mut handles = Vec::new();

        let failed = loop {
            match allocator.alloc(24) {
                Ok(handle) => handles.push(handle),
                Err(err) => break err,
            }
        };
        assert_eq!(failed, AllocError::AllocationExhausted { requested: 24 });
        // 10 * 24 = 240, leaving 16 bytes
        assert_eq!(handles.len(), 10);

        // Free every other allocation: 80 bytes free, but no hole over 24
        for handle in handles.iter().step_by(2) {
            allocator.free(*handle);
        }
        let before = layout(&allocator);
        let (_, stats) = allocator.stats();
        assert_eq!(stats.free_bytes, 5 * 24 + 16);
        assert_eq!(stats.largest_hole, 24);

        assert_eq!(
            allocator.alloc(60),
            Err(AllocError::AllocationExhausted { requested: 60 })
        );
        assert_eq!(layout(&allocator), before, "{}", strategy);
        assert_valid(&allocator);
    }
}

#[test]
fn lifecycle() {
    let mut allocator = new(128, Strategy::FirstFit);
    allocator.alloc(16).unwrap();

    allocator.destroy();
    assert_eq!(allocator.alloc(16), Err(AllocError::Uninitialized));
    assert_eq!(allocator.size(), 0);
    allocator.free(Handle::NULL);
    allocator.destroy();

    allocator.init(128, Strategy::NextFit).unwrap();
    assert_eq!(allocator.size(), 1);
    assert_eq!(allocator.alloc(16).unwrap().offset(), 0);
}

#[test]
fn independent_allocators() {
    let mut one = new(64, Strategy::FirstFit);
    let mut two = new(64, Strategy::FirstFit);

    let a = one.alloc(16).unwrap();
    let b = two.alloc(32).unwrap();
    assert_eq!(a.offset(), b.offset());

    one.free(a);
    assert_eq!(one.size(), 1);
    assert_eq!(two.size(), 2);
    assert!(two.resolve(b).is_some());
}
