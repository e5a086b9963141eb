//! Two fibers exchanging typed events in strict alternation.

mod common;

use common::init_test_logging;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use weft::{Event, FiberRef, FiberSystem};

const ROUNDS: u64 = 1000;

#[test]
fn ping_pong_strict_alternation() {
    init_test_logging();
    let system = FiberSystem::with_workers(4).expect("system start");
    let mut main = system.main_context().expect("main context");

    let init = Event::<FiberRef>::named("init");
    let ping = Event::<u64>::named("ping");
    let pong = Event::<u64>::named("pong");

    let pings = Arc::new(AtomicU64::new(0));
    let pongs = Arc::new(AtomicU64::new(0));

    let pings_sent = Arc::clone(&pings);
    let init_a = init.clone();
    let ping_a = ping.clone();
    let pong_a = pong.clone();
    let pinger = system
        .spawn(move |ctx| {
            let peer = init_a.await_next(ctx);
            for round in 0..ROUNDS {
                peer.emit(&ping_a, round);
                pings_sent.fetch_add(1, Ordering::SeqCst);
                let reply = pong_a.await_next(ctx);
                assert_eq!(reply, round, "pong out of order");
            }
        })
        .expect("spawn pinger");

    let pongs_sent = Arc::clone(&pongs);
    let init_b = init.clone();
    let ping_b = ping.clone();
    let pong_b = pong.clone();
    let ponger = system
        .spawn(move |ctx| {
            let peer = init_b.await_next(ctx);
            for round in 0..ROUNDS {
                let request = ping_b.await_next(ctx);
                assert_eq!(request, round, "ping out of order");
                pongs_sent.fetch_add(1, Ordering::SeqCst);
                peer.emit(&pong_b, round);
            }
        })
        .expect("spawn ponger");

    // The receiver's init is enqueued before the initiator can send its
    // first ping, so the ponger always sees init first in its mailbox.
    ponger.emit(&init, pinger.clone());
    pinger.emit(&init, ponger.clone());

    system.all_fibers_finished().await_next(&mut main);

    assert_eq!(pings.load(Ordering::SeqCst), ROUNDS);
    assert_eq!(pongs.load(Ordering::SeqCst), ROUNDS);
    assert_eq!(system.running_fibers(), 0);
}
