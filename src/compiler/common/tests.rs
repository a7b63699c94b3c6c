use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

fn buffer(n: u32, capacity: usize) -> HistoryBuffer<IterSource<std::ops::Range<u32>>> {
    HistoryBuffer::with_capacity(IterSource(0..n), capacity)
}

#[test]
fn test_replay_after_prev() {
    let mut buf = buffer(10, 4);
    assert_eq!(buf.next().unwrap(), 0);
    assert_eq!(buf.next().unwrap(), 1);
    assert_eq!(buf.next().unwrap(), 2);
    assert_eq!(buf.prev(2).unwrap(), 1);
    assert_eq!(buf.next().unwrap(), 1);
    assert_eq!(buf.next().unwrap(), 2);
    assert_eq!(buf.next().unwrap(), 3);
}

#[test]
fn test_prev_at_start() {
    let mut buf = buffer(3, 4);
    assert!(matches!(buf.prev(1), Err(HistoryError::AtStart)));
}

#[test]
fn test_prev_past_window() {
    let mut buf = buffer(10, 2);
    for _ in 0..5 {
        buf.next().unwrap();
    }
    assert!(matches!(
        buf.prev(3),
        Err(HistoryError::Underflow { requested: 3, available: 2 })
    ));
    assert_eq!(buf.prev(2).unwrap(), 3);
}

#[test]
fn test_end_of_input() {
    let mut buf = buffer(1, 2);
    assert_eq!(buf.next().unwrap(), 0);
    assert!(matches!(buf.next(), Err(HistoryError::EndOfInput)));
    assert_eq!(buf.try_next().unwrap(), None);
}

#[test]
fn test_zero_capacity_keeps_nothing() {
    let mut buf = buffer(3, 0);
    assert_eq!(buf.next().unwrap(), 0);
    assert!(matches!(buf.prev(1), Err(HistoryError::AtStart)));
    assert_eq!(buf.position(), 1);
}

#[test]
fn test_checkpoint_rollback() {
    let mut buf = buffer(10, 8);
    buf.next().unwrap();
    let cp = buf.checkpoint();
    buf.next().unwrap();
    buf.next().unwrap();
    buf.rollback(cp).unwrap();
    assert_eq!(buf.next().unwrap(), 1);
}

#[test]
fn test_shrink_keeps_pending_replay() {
    let mut buf = buffer(10, 8);
    for _ in 0..6 {
        buf.next().unwrap();
    }
    buf.prev(4).unwrap();
    buf.set_capacity(2);
    assert_eq!(buf.next().unwrap(), 2);
    assert_eq!(buf.next().unwrap(), 3);
    assert_eq!(buf.next().unwrap(), 4);
}

#[test]
fn test_source_error_passes_through() {
    struct Failing;
    impl Source for Failing {
        type Item = u8;
        fn pull(&mut self) -> anyhow::Result<Option<u8>> {
            Err(SyntaxError::new(7, "x", "boom").into())
        }
    }
    let mut buf = HistoryBuffer::with_capacity(Failing, 2);
    let err = buf.try_next().unwrap_err();
    assert_eq!(err.downcast_ref::<SyntaxError>().unwrap().line, 7);
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_replay_is_faithful(capacity in 1usize..16, forward in 1usize..32, back in 1usize..16) {
        let mut buf = buffer(64, capacity);
        let mut seen = Vec::new();
        for _ in 0..forward {
            seen.push(buf.next().unwrap());
        }
        let back = back.min(capacity).min(forward);
        buf.prev(back).unwrap();
        for expected in &seen[forward - back..] {
            prop_assert_eq!(buf.next().unwrap(), *expected);
        }
        prop_assert_eq!(buf.position(), forward);
    }

    #[test]
    fn prop_position_counts_forward_steps(capacity in 0usize..8, steps in 0usize..40) {
        let mut buf = buffer(100, capacity);
        for _ in 0..steps {
            buf.next().unwrap();
        }
        prop_assert_eq!(buf.position(), steps);
    }
}
