//! Work stealing logic.
//!
//! Thieves take from the opposite end of a victim's deque than the owner
//! uses, so contention concentrates on a single end. Victims are probed in a
//! full cycle starting at a random index; a worker that finds nothing parks
//! briefly and re-probes.

use crate::runtime::control_block::{ControlBlock, WorkerId};
use crate::runtime::scheduler::worker::WorkerShared;
use crate::util::XorShift64;
use crossbeam_deque::Steal;
use std::sync::Arc;

/// Tries to steal one block from a random sibling's deque.
///
/// Only the stealable deques are probed; inboxes belong to their workers
/// alone, which is what keeps pinned fibers on their bound worker.
pub(crate) fn steal_block(
    workers: &[WorkerShared],
    thief: WorkerId,
    rng: &mut XorShift64,
) -> Option<Arc<ControlBlock>> {
    let len = workers.len();
    if len <= 1 {
        return None;
    }

    let start = rng.next_usize(len);
    for i in 0..len {
        let victim = (start + i) % len;
        if victim == thief {
            continue;
        }
        loop {
            match workers[victim].stealer.steal() {
                Steal::Success(block) => return Some(block),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::runtime::scheduler::inbox::Inbox;
    use crate::runtime::scheduler::worker::Parker;
    use crossbeam_deque::Worker as Deque;

    fn block(name: &str) -> Arc<ControlBlock> {
        Arc::new(ControlBlock::new_fiber(Path::named(name), None, None))
    }

    fn rig(count: usize) -> (Vec<Deque<Arc<ControlBlock>>>, Vec<WorkerShared>) {
        let mut deques = Vec::new();
        let mut shared = Vec::new();
        for _ in 0..count {
            let deque = Deque::new_lifo();
            shared.push(WorkerShared {
                inbox: Inbox::new(),
                parker: Parker::new(),
                stealer: deque.stealer(),
            });
            deques.push(deque);
        }
        (deques, shared)
    }

    #[test]
    fn steals_from_a_busy_sibling() {
        let (deques, shared) = rig(2);
        deques[1].push(block("victim-work"));

        let mut rng = XorShift64::new(42);
        assert!(steal_block(&shared, 0, &mut rng).is_some());
    }

    #[test]
    fn single_worker_never_steals() {
        let (deques, shared) = rig(1);
        deques[0].push(block("own-work"));

        let mut rng = XorShift64::new(42);
        assert!(steal_block(&shared, 0, &mut rng).is_none());
    }

    #[test]
    fn skips_own_deque() {
        let (deques, shared) = rig(3);
        deques[0].push(block("own-work"));

        let mut rng = XorShift64::new(7);
        for _ in 0..20 {
            assert!(steal_block(&shared, 0, &mut rng).is_none());
        }
        assert!(deques[0].pop().is_some(), "own work must stay in place");
    }

    #[test]
    fn full_cycle_finds_the_one_busy_victim() {
        let (deques, shared) = rig(4);
        deques[3].push(block("needle"));

        // Whatever the random start index, one probe cycle visits everyone.
        for seed in 1..20 {
            deques[3].push(block("needle"));
            let mut rng = XorShift64::new(seed);
            assert!(steal_block(&shared, 0, &mut rng).is_some());
            while deques[3].pop().is_some() {}
        }
    }

    #[test]
    fn inboxes_are_never_stolen_from() {
        let (_deques, shared) = rig(2);
        shared[1].inbox.push(block("pinned"));

        let mut rng = XorShift64::new(9);
        assert!(steal_block(&shared, 0, &mut rng).is_none());
        assert!(shared[1].inbox.pop().is_some());
    }
}
