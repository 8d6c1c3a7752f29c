//! Property tests for the buffering and spill layers

mod common;

use std::collections::VecDeque;

use proptest::prelude::*;
use tempfile::TempDir;

use fieldlink_core::{
    time::FixedTime, DeliveryManager, DirStore, Event, EventKind, MemoryStore, OverflowStore,
    RingBuffer, SpillKey, StatusCode,
};

use common::{measurements, FakeServer};

const CAP: usize = 6;

fn tagged(id: u32) -> Event {
    Event::measurement("2024-05-01T10:00:00 -05:00", &id.to_string()).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    Append,
    Reconcile(Vec<bool>),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Append),
        1 => prop::collection::vec(any::<bool>(), 0..=CAP).prop_map(Op::Reconcile),
    ]
}

fn stored_event() -> impl Strategy<Value = Event> {
    (
        prop_oneof![Just(EventKind::Connection), Just(EventKind::Measurement)],
        any::<u16>(),
        r#"[0-9T:+ \-|\\\n\r]{0,24}"#,
        r#"[a-z0-9{}":,.|\\\n\r \[\]é]{0,200}"#,
    )
        .prop_map(|(kind, code, ts, payload)| {
            Event::new(kind, StatusCode(code), &ts, &payload).unwrap()
        })
}

proptest! {
    #[test]
    fn offline_ingest_keeps_everything_up_to_capacity(
        sizes in prop::collection::vec(1usize..=3, 1..20),
    ) {
        let mut mgr: DeliveryManager<FakeServer, MemoryStore<64, 3>, FixedTime, CAP> =
            DeliveryManager::new(
                FakeServer::accepting(),
                MemoryStore::new(),
                FixedTime::new(0),
                Default::default(),
            );
        let mut failing: DeliveryManager<FakeServer, MemoryStore<1, 3>, FixedTime, CAP> =
            DeliveryManager::new(
                FakeServer::accepting(),
                MemoryStore::new(),
                FixedTime::new(0),
                Default::default(),
            );
        failing.store_mut().set_fail_writes(true);

        let mut total = 0;
        for n in sizes {
            let batch = measurements(total..total + n);
            total += n;
            mgr.ingest_new(&batch, false).unwrap();
            failing.ingest_new(&batch, false).unwrap();

            prop_assert_eq!(failing.buffer().len(), total.min(CAP));
            prop_assert_eq!(mgr.buffer().len() + mgr.stats().spilled, total);
            prop_assert_eq!(mgr.stats().evicted, 0);
        }
    }

    #[test]
    fn extract_returns_oldest_retained_in_order(
        ops in prop::collection::vec(op(), 1..40),
        k in 1usize..=CAP,
    ) {
        let mut buffer = RingBuffer::<CAP>::new();
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Append => {
                    if model.len() == CAP {
                        model.pop_front();
                    }
                    model.push_back(next);
                    buffer.append(tagged(next));
                    next += 1;
                }
                Op::Reconcile(delivered) => {
                    let outcomes: Vec<StatusCode> = delivered
                        .iter()
                        .map(|&ok| if ok { StatusCode::CREATED } else { StatusCode::INTERNAL_SERVER_ERROR })
                        .collect();
                    let mut i = 0;
                    model.retain(|_| {
                        let keep = !delivered.get(i).copied().unwrap_or(false);
                        i += 1;
                        keep
                    });
                    buffer.reconcile(&outcomes);
                }
            }
            prop_assert_eq!(buffer.len(), model.len());
        }

        match buffer.extract_oldest(k) {
            None => prop_assert!(model.is_empty()),
            Some(batch) => {
                let expected: Vec<Event> = model.iter().take(k).map(|&id| tagged(id)).collect();
                prop_assert_eq!(batch.as_slice(), expected.as_slice());
                prop_assert_eq!(buffer.len(), model.len() - expected.len());
            }
        }
    }

    #[test]
    fn dir_store_round_trip(events in prop::collection::vec(stored_event(), 0..=CAP)) {
        let dir = TempDir::new().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        let key = store.store(SpillKey(1_714_557_600), &events).unwrap();
        let mut into: [Event; CAP] = Default::default();
        let loaded = store.load(key, &mut into).unwrap();

        prop_assert_eq!(&into[..loaded], events.as_slice());
        prop_assert_eq!(store.stats().parse_errors, 0);
    }
}

#[test]
fn reconcile_on_empty_buffer_is_a_no_op() {
    let mut buffer = RingBuffer::<CAP>::new();
    buffer.append(tagged(1));
    buffer.append(tagged(2));

    buffer.reconcile(&[StatusCode::OK, StatusCode::CREATED]);
    assert!(buffer.is_empty());
    assert_eq!(buffer.reconcile(&[]), 0);
    assert!(buffer.is_empty());
}
