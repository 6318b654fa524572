//! At-most-once evaluation per key, with results owned by the cycle that
//! obtained them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// Identifies one build cycle within the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CycleId(u64);

impl CycleId {
    /// Allocates an id no other cycle in this process has used.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Cell<V> = Arc<OnceLock<V>>;

/// A map from cache key to an in-flight cell.
///
/// The first caller for a key runs the computation; concurrent callers for
/// the same key block on the cell and receive the same value. Every value a
/// caller receives is also claimed by its cycle, and only
/// [`finish`](Self::finish) or [`discard`](Self::discard) for that cycle
/// releases it, so overlapping cycles never commit or drop each other's
/// results. Distinct keys never contend beyond a shard lookup.
pub struct InFlight<K, V> {
    cells: DashMap<K, Cell<V>>,
    claims: DashMap<CycleId, HashMap<K, Cell<V>>>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            claims: DashMap::new(),
        }
    }

    /// Returns the value for `key`, computing it with `run` if no caller has
    /// yet. The flag is `true` only for the caller whose `run` executed.
    pub fn get_or_run(&self, cycle: CycleId, key: K, run: impl Fn() -> V) -> (V, bool) {
        self.get_or_run_if(cycle, key, |_| true, run)
    }

    /// Like [`get_or_run`](Self::get_or_run), but a finished value that
    /// `accept` rejects is replaced by a fresh run instead of being shared.
    pub fn get_or_run_if(
        &self,
        cycle: CycleId,
        key: K,
        accept: impl Fn(&V) -> bool,
        run: impl Fn() -> V,
    ) -> (V, bool) {
        loop {
            let cell = Arc::clone(
                &*self
                    .cells
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceLock::new())),
            );
            let mut ran = false;
            let value = cell
                .get_or_init(|| {
                    ran = true;
                    run()
                })
                .clone();
            if ran || accept(&value) {
                self.claims
                    .entry(cycle)
                    .or_default()
                    .insert(key, cell);
                return (value, ran);
            }
            self.cells
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        }
    }

    /// Ends `cycle` and returns every value it claimed. The cells it used
    /// are released, so later cycles consult the committed tier instead.
    pub fn finish(&self, cycle: CycleId) -> Vec<(K, V)> {
        let Some((_, claimed)) = self.claims.remove(&cycle) else {
            return Vec::new();
        };
        claimed
            .into_iter()
            .filter_map(|(key, cell)| {
                self.cells
                    .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
                let value = cell.get()?.clone();
                Some((key, value))
            })
            .collect()
    }

    /// Ends `cycle` and drops what it claimed. Values another cycle also
    /// claimed stay with that cycle.
    pub fn discard(&self, cycle: CycleId) {
        self.finish(cycle);
    }

    /// Number of live cells, finished or not.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if there are no live cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn runs_once_per_key() {
        let gate: InFlight<&str, u32> = InFlight::new();
        let cycle = CycleId::next();
        let (a, ran_a) = gate.get_or_run(cycle, "k", || 1);
        let (b, ran_b) = gate.get_or_run(cycle, "k", || 2);
        assert_eq!((a, ran_a), (1, true));
        assert_eq!((b, ran_b), (1, false));
        assert_eq!(gate.finish(cycle), vec![("k", 1)]);
    }

    #[test]
    fn concurrent_callers_share_one_run() {
        let gate: Arc<InFlight<u32, u32>> = Arc::new(InFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let cycle = CycleId::next();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.get_or_run(cycle, 7, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        42
                    })
                    .0
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finish_releases_cells() {
        let gate: InFlight<u32, u32> = InFlight::new();
        let cycle = CycleId::next();
        gate.get_or_run(cycle, 1, || 10);
        gate.get_or_run(cycle, 2, || 20);
        let mut finished = gate.finish(cycle);
        finished.sort();
        assert_eq!(finished, vec![(1, 10), (2, 20)]);
        assert!(gate.is_empty());
        assert!(gate.finish(cycle).is_empty());
        let (_, ran) = gate.get_or_run(CycleId::next(), 1, || 11);
        assert!(ran);
    }

    #[test]
    fn rejected_values_are_recomputed() {
        let gate: InFlight<&str, &str> = InFlight::new();
        let old = CycleId::next();
        let new = CycleId::next();
        assert_eq!(gate.get_or_run(old, "top", || "old"), ("old", true));
        let (value, ran) = gate.get_or_run_if(new, "top", |v| *v == "new", || "new");
        assert_eq!((value, ran), ("new", true));
        assert_eq!(gate.finish(old), vec![("top", "old")]);
        assert_eq!(gate.finish(new), vec![("top", "new")]);
    }

    #[test]
    fn discarding_one_cycle_keeps_another() {
        let gate: InFlight<u32, u32> = InFlight::new();
        let cancelled = CycleId::next();
        let current = CycleId::next();
        gate.get_or_run(cancelled, 1, || 10);
        gate.get_or_run(current, 1, || 11);
        gate.get_or_run(current, 2, || 20);
        gate.discard(cancelled);

        let mut finished = gate.finish(current);
        finished.sort();
        assert_eq!(finished, vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn unclaimed_results_are_not_committed() {
        let gate: InFlight<u32, u32> = InFlight::new();
        let cancelled = CycleId::next();
        let current = CycleId::next();
        gate.get_or_run(cancelled, 1, || 10);
        gate.get_or_run(current, 2, || 20);
        assert_eq!(gate.finish(current), vec![(2, 20)]);
        gate.discard(cancelled);
        assert!(gate.is_empty());
    }

    #[test]
    fn waiting_callers_share_a_running_cell() {
        let gate: Arc<InFlight<u32, u32>> = Arc::new(InFlight::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let first = CycleId::next();
        let worker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.get_or_run(first, 1, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    10
                })
                .0
            })
        };
        started_rx.recv().unwrap();
        assert!(gate.finish(CycleId::next()).is_empty());
        assert_eq!(gate.len(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(worker.join().unwrap(), 10);
        let second = CycleId::next();
        assert_eq!(gate.get_or_run(second, 1, || 99), (10, false));
        assert_eq!(gate.finish(first), vec![(1, 10)]);
    }
}
