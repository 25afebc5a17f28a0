//! Allocator properties over random operation sequences

use proptest::prelude::*;
use proptest::sample::Index;
use umalloc::{BoundedSegment, CHUNK_SIZE, Heap, Payload};

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Free(Index),
    Resize(Index, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..600).prop_map(Op::Allocate),
        2 => any::<Index>().prop_map(Op::Free),
        2 => (any::<Index>(), 0usize..900).prop_map(|(i, size)| Op::Resize(i, size)),
    ]
}

/// A live allocation and the byte its requested prefix is filled with
struct Live {
    payload: Payload,
    size: usize,
    fill: u8,
}

fn fill(heap: &mut Heap<BoundedSegment>, live: &Live) {
    heap.payload_mut(live.payload).unwrap()[..live.size].fill(live.fill);
}

fn assert_disjoint(heap: &Heap<BoundedSegment>, live: &[Live]) {
    let mut ranges: Vec<_> = live
        .iter()
        .map(|l| {
            let start = l.payload.offset();
            (start, start + heap.capacity(l.payload).unwrap())
        })
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
    }
}

proptest! {
    #[test]
    fn live_payloads_never_overlap_and_keep_their_bytes(ops in prop::collection::vec(op(), 1..120)) {
        let mut heap = Heap::init(BoundedSegment::default()).unwrap();
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            let tag = (step % 251) as u8 + 1;
            match op {
                Op::Allocate(size) => {
                    let payload = heap.allocate(size).unwrap();
                    let entry = Live { payload, size, fill: tag };
                    fill(&mut heap, &entry);
                    live.push(entry);
                }
                Op::Free(index) if !live.is_empty() => {
                    let entry = live.swap_remove(index.index(live.len()));
                    heap.free(entry.payload);
                }
                Op::Resize(index, size) if !live.is_empty() => {
                    let at = index.index(live.len());
                    let old = &live[at];
                    let (old_payload, old_size, old_fill) = (old.payload, old.size, old.fill);

                    match heap.resize(Some(old_payload), size) {
                        None => {
                            prop_assert_eq!(size, 0);
                            live.swap_remove(at);
                        }
                        Some(payload) => {
                            let kept = old_size.min(size);
                            let bytes = heap.payload(payload).unwrap();
                            prop_assert!(bytes[..kept].iter().all(|&b| b == old_fill));
                            live[at] = Live { payload, size, fill: tag };
                            fill(&mut heap, &live[at]);
                        }
                    }
                }
                _ => {}
            }

            prop_assert!(heap.check().is_ok());
            assert_disjoint(&heap, &live);
            for entry in &live {
                let bytes = heap.payload(entry.payload).unwrap();
                prop_assert!(bytes[..entry.size].iter().all(|&b| b == entry.fill));
            }
        }
    }

    #[test]
    fn allocate_then_free_leaves_free_space_unchanged(prefix in prop::collection::vec(1usize..300, 0..8), size in 1usize..3000) {
        let mut heap = Heap::init(BoundedSegment::default()).unwrap();
        for n in prefix {
            heap.allocate(n).unwrap();
        }
        let before = heap.stats();

        let p = heap.allocate(size).unwrap();
        heap.free(p);

        let after = heap.stats();
        if after.arena_bytes == before.arena_bytes {
            prop_assert_eq!(after.free_bytes, before.free_bytes);
        } else {
            // The request forced the arena to grow; the new space is free too
            prop_assert_eq!(after.free_bytes - before.free_bytes, after.arena_bytes - before.arena_bytes);
        }
        prop_assert_eq!(after.allocated_blocks, before.allocated_blocks);
    }

    #[test]
    fn adjacent_frees_merge_in_either_order(a in 1usize..200, b in 1usize..200, a_first in any::<bool>()) {
        let mut heap = Heap::init(BoundedSegment::default()).unwrap();
        let pa = heap.allocate(a).unwrap();
        let pb = heap.allocate(b).unwrap();
        let _fence = heap.allocate(8).unwrap();
        let combined = heap.capacity(pa).unwrap() + heap.capacity(pb).unwrap() + 8;

        if a_first {
            heap.free(pa);
            heap.free(pb);
        } else {
            heap.free(pb);
            heap.free(pa);
        }

        let free: Vec<_> = heap.blocks().filter(|blk| !blk.allocated).collect();
        prop_assert_eq!(free[0].payload, pa);
        prop_assert_eq!(free[0].capacity(), combined);

        let arena = heap.stats().arena_bytes;
        prop_assert_eq!(heap.allocate(combined), Some(pa));
        prop_assert_eq!(heap.stats().arena_bytes, arena);
    }
}

#[test]
fn first_fit_walkthrough() {
    let mut heap = Heap::init(BoundedSegment::default()).unwrap();

    let p1 = heap.allocate(8).unwrap();
    let p2 = heap.allocate(16).unwrap();
    assert_ne!(p1, p2);
    assert!(p1.offset() + heap.capacity(p1).unwrap() <= p2.offset());

    heap.free(p1);
    let p3 = heap.allocate(8).unwrap();
    let p3_end = p3.offset() + heap.capacity(p3).unwrap();
    assert!(p3_end <= p2.offset() || p3.offset() >= p2.offset() + heap.capacity(p2).unwrap());

    assert_eq!(heap.resize(Some(p2), 4), Some(p2));
    heap.check().unwrap();
}

#[test]
fn resize_of_nothing_is_allocate_and_resize_to_zero_is_free() {
    let mut a = Heap::init(BoundedSegment::default()).unwrap();
    let mut b = Heap::init(BoundedSegment::default()).unwrap();

    let pa = a.resize(None, 10).unwrap();
    let pb = b.allocate(10).unwrap();
    assert_eq!(pa, pb);
    assert_eq!(a.stats(), b.stats());

    assert_eq!(a.resize(Some(pa), 0), None);
    b.free(pb);
    assert_eq!(a.stats(), b.stats());
}

#[test]
fn growing_the_last_block_extends_the_arena() {
    let mut heap = Heap::init(BoundedSegment::default()).unwrap();
    let p = heap.allocate(CHUNK_SIZE - 64).unwrap();
    heap.payload_mut(p).unwrap()[0] = 0xEE;

    let q = heap.resize(Some(p), 3 * CHUNK_SIZE).unwrap();
    assert_eq!(heap.payload(q).unwrap()[0], 0xEE);
    assert!(heap.stats().arena_bytes > 3 * CHUNK_SIZE);
    heap.check().unwrap();
}
