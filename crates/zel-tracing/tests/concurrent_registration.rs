use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use zel_api::{ApiId, ApiParams, DeviceGetParams, ZeResult};
use zel_tracing::{callback, CallbackStage, CallbackTable, Tracer, TracerDesc, TracingLayer};

const READERS: usize = 4;
const CALLS: usize = 2_000;

/// Prologue table whose two slots both record `tag`.
fn tagged_table(tag: usize, seen: &Arc<[AtomicUsize; 3]>) -> CallbackTable {
    let mut table = CallbackTable::new();
    for api in [ApiId::DeviceGet, ApiId::ContextCreate] {
        let seen = seen.clone();
        table.set(
            api,
            Some(callback(move |_, _, _, _| {
                seen[tag].fetch_add(1, Ordering::SeqCst);
            })),
        );
    }
    table
}

fn registered_prologues(tracer: &Tracer) -> bool {
    let rendered = format!("{tracer:?}");
    rendered.contains("zeDeviceGet") && rendered.contains("zeContextCreate")
}

#[test]
fn registration_is_atomic_while_calls_are_in_flight() {
    let layer = TracingLayer::new(true);
    let seen: Arc<[AtomicUsize; 3]> = Arc::new(Default::default());
    let tracer = layer.create_tracer(TracerDesc::default());
    tracer.set_prologues(tagged_table(0, &seen));
    tracer.set_enabled(true);
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut round = 0usize;
            while !done.load(Ordering::SeqCst) {
                tracer.set_prologues(tagged_table(round % 2, &seen));
                let slot = seen.clone();
                tracer.register_callback(
                    ApiId::DeviceGet,
                    CallbackStage::Prologue,
                    Some(callback(move |_, _, _, _| {
                        slot[2].fetch_add(1, Ordering::SeqCst);
                    })),
                );
                assert!(registered_prologues(&tracer));
                round += 1;
            }
        });

        let (layer, tracer, seen) = (&layer, &tracer, &seen);
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                scope.spawn(move || {
                    for _ in 0..CALLS {
                        let before: usize = seen.iter().map(|c| c.load(Ordering::SeqCst)).sum();
                        let mut params = ApiParams::from(DeviceGetParams::default());
                        let mut call = layer.begin(ApiId::DeviceGet).expect("tracer enabled");
                        call.prologues(&mut params);
                        call.epilogues(&mut params, ZeResult::Success);
                        drop(call);
                        let after: usize = seen.iter().map(|c| c.load(Ordering::SeqCst)).sum();
                        // Other readers may have fired too, but never this one zero times.
                        assert!(after > before);
                        assert!(registered_prologues(&tracer));
                    }
                })
            })
            .collect();
        let results: Vec<_> = readers.into_iter().map(|reader| reader.join()).collect();
        done.store(true, Ordering::SeqCst);
        for result in results {
            result.unwrap();
        }
    });

    // Every call ran exactly one prologue, from one of the registered callbacks.
    let total: usize = seen.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(total, READERS * CALLS);
}
