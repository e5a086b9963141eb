//! Fiber lifecycle: terminal events, futures, kill, shutdown, pinning.

mod common;

use common::init_test_logging;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft::{Context, Event, Fiber, FiberSystem, Locality};

#[test]
fn finished_event_carries_the_result_to_the_parent() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    let child = system
        .spawn(|_ctx| String::from("done"))
        .expect("spawn child");

    let value = child.finished_event::<String>().await_next(&mut main);
    assert_eq!(value, "done");
}

#[test]
fn crashed_fiber_reports_to_its_parent_and_dies() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    let child = system
        .spawn(|_ctx| -> () {
            panic!("exploding fiber");
        })
        .expect("spawn child");

    child.crashed_event().await_next(&mut main);
    system.all_fibers_finished().await_next(&mut main);
    assert_eq!(system.running_fibers(), 0, "crashed fiber was reclaimed");
}

#[test]
fn future_fiber_delivers_its_result() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    let future = system.spawn_future(|_ctx| 6u32 * 7).expect("spawn future");
    assert_eq!(future.await_result(&mut main).expect("value"), 42);

    // A second await observes the stored result without suspending.
    assert_eq!(future.await_result(&mut main).expect("value"), 42);
    assert_eq!(
        future.result().try_get().expect("completed").expect("value"),
        42
    );
}

#[test]
fn crashed_future_rejects_its_promise() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    let future = system
        .spawn_future(|_ctx| -> u32 {
            panic!("future went sideways");
        })
        .expect("spawn future");

    let err = future.await_result(&mut main).expect_err("rejected");
    assert!(err.is_crash());
    assert!(err.to_string().contains("future went sideways"));
}

#[test]
fn terminated_future_rejects_without_a_crash() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    let future = system
        .spawn_future(|ctx| -> u32 { ctx.terminate() })
        .expect("spawn future");

    let err = future.await_result(&mut main).expect_err("rejected");
    assert!(err.is_kill());
    assert!(!err.is_crash());
}

#[test]
fn terminate_unwinds_the_fiber_stack() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    struct BumpOnDrop(Arc<AtomicUsize>);
    impl Drop for BumpOnDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let drops_fiber = Arc::clone(&drops);
    let future = system
        .spawn_future(move |ctx| -> u32 {
            let _cleanup = BumpOnDrop(drops_fiber);
            ctx.terminate()
        })
        .expect("spawn future");

    let _ = future.await_result(&mut main).expect_err("rejected");
    assert_eq!(drops.load(Ordering::SeqCst), 1, "cleanup ran during unwind");
}

#[test]
fn shutdown_turns_spawn_into_dead_letters() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");

    assert!(!system.is_shutting_down());
    system.shutdown();
    assert!(system.is_shutting_down());

    let fiber = system.spawn(|_ctx| ()).expect("spawn after shutdown");
    assert_eq!(fiber.locality(), Locality::DeadLetter);
    assert_eq!(system.running_fibers(), 0);

    // Payloads sent to the dead letter are released, not delivered.
    fiber.emit(&Event::<u32>::named("ignored"), 1);

    // A future spawned during shutdown resolves with an error instead of
    // hanging its awaiters.
    let future = system.spawn_future(|_ctx| 1u32).expect("spawn future");
    let err = future.result().try_get().expect("completed").expect_err("rejected");
    assert_eq!(err.kind(), weft::ErrorKind::PromiseDropped);
}

#[test]
fn pinned_fiber_resumes_only_on_its_worker() {
    init_test_logging();
    let system = FiberSystem::with_workers(4).expect("system start");
    let mut main = system.main_context().expect("main context");
    let main_ref = system.main_fiber();

    let target = 2;
    let kick = Event::<()>::named("kick");
    let verdict = Event::<bool>::named("pin-verdict");

    let kick_fiber = kick.clone();
    let verdict_fiber = verdict.clone();
    let fiber = system
        .fiber()
        .named("pinned")
        .pinned_to(target)
        .spawn(move |ctx| {
            let mut on_target = ctx.worker() == Some(target);
            for _ in 0..100 {
                ctx.yield_now();
                on_target &= ctx.worker() == Some(target);
            }
            for _ in 0..10 {
                kick_fiber.await_next(ctx);
                on_target &= ctx.worker() == Some(target);
            }
            main_ref.emit(&verdict_fiber, on_target);
        })
        .expect("spawn pinned");

    for _ in 0..10 {
        fiber.emit(&kick, ());
    }
    assert!(
        verdict.await_next(&mut main),
        "every resumption must happen on the pinned worker"
    );
}

#[test]
fn fiber_trait_front_end() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");

    struct Doubler {
        input: u64,
    }

    impl Fiber for Doubler {
        type Output = u64;

        fn run(&mut self, _ctx: &mut Context<'_>) -> u64 {
            self.input * 2
        }
    }

    let fiber = system.run(Doubler { input: 21 }).expect("run fiber");
    let value = fiber.finished_event::<u64>().await_next(&mut main);
    assert_eq!(value, 42);
}

#[test]
fn main_context_is_taken_once() {
    init_test_logging();
    let system = FiberSystem::with_workers(1).expect("system start");

    let first = system.main_context();
    assert!(first.is_ok());

    let second = system.main_context();
    let err = second.expect_err("second take must fail");
    assert_eq!(err.kind(), weft::ErrorKind::AlreadyFiberized);
}

#[test]
fn system_identity_and_shape() {
    init_test_logging();
    let system = FiberSystem::with_workers(3).expect("system start");

    assert_eq!(system.worker_count(), 3);
    assert_eq!(system.id().to_string().len(), 32);
    assert_ne!(system.id().as_u128(), 0);

    let other = FiberSystem::with_workers(1).expect("second system");
    assert_ne!(system.id(), other.id());
}

#[test]
fn event_server_with_detached_handler() {
    init_test_logging();
    let system = FiberSystem::with_workers(2).expect("system start");
    let mut main = system.main_context().expect("main context");
    let main_ref = system.main_fiber();

    let add = Event::<u64>::named("add");
    let total = Event::<u64>::named("running-total");

    let add_fiber = add.clone();
    let total_fiber = total.clone();
    let server = system
        .spawn(move |ctx| -> () {
            let sum = std::rc::Rc::new(std::cell::Cell::new(0u64));
            let sum_handler = std::rc::Rc::clone(&sum);
            add_fiber
                .bind(ctx, move |_ctx, value| {
                    sum_handler.set(sum_handler.get() + *value);
                    main_ref.emit(&total_fiber, sum_handler.get());
                })
                .detach();
            ctx.process_forever()
        })
        .expect("spawn server");

    for value in [3, 4, 5] {
        server.emit(&add, value);
    }

    assert_eq!(total.await_next(&mut main), 3);
    assert_eq!(total.await_next(&mut main), 7);
    assert_eq!(total.await_next(&mut main), 12);

    // The server never finishes; it is abandoned at teardown.
    drop(main);
    drop(system);
}
