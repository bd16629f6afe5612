//! Fan-out/fan-in over regions.
//!
//! [`RegionScanner::run`] executes one work item per region on a bounded
//! worker pool and joins on all of them.  Every region gets a result: the
//! work function's value, its error, or the message of a panic raised while
//! processing it.  Nothing is cancelled once started.
//!
//! Workers that need to publish into shared state go through an
//! [`Accumulator`], whose lock is held only while a region's partial result
//! is merged in.
//!
//! With the `parallel` feature (default) the pool is a dedicated Rayon
//! thread pool; without it, regions run one after another on the calling
//! thread under the same contract.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::coord::RegionPos;

#[derive(Error, Debug)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot start worker pool: {0}")]
    Pool(String),
}

/// Per-region results, keyed by region.
pub type ScanOutcome<R, E> = BTreeMap<RegionPos, Result<R, TaskError<E>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoned by a panicking worker; the data is still usable.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Completed-region counter shared by all workers.
pub struct Progress {
    label: String,
    total: usize,
    done:  Mutex<usize>,
}

impl Progress {
    pub fn new(label: impl Into<String>, total: usize) -> Self {
        Self { label: label.into(), total, done: Mutex::new(0) }
    }

    /// Record one finished region and log the running percentage.
    pub fn tick(&self) -> usize {
        let mut done = lock(&self.done);
        *done += 1;
        let pct = if self.total == 0 { 100.0 } else { *done as f64 * 100.0 / self.total as f64 };
        log::info!("{}: {}/{} ({:.1}%)", self.label, *done, self.total, pct);
        *done
    }

    pub fn done(&self) -> usize {
        *lock(&self.done)
    }
}

// ── Accumulator ──────────────────────────────────────────────────────────────

/// Cross-region shared state.  The only access is a merge closure or a final
/// read.
#[derive(Debug, Default)]
pub struct Accumulator<T> {
    inner: Mutex<T>,
}

impl<T> Accumulator<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    /// Run `f` with exclusive access.  Keep `f` to the merge itself; do chunk
    /// work before calling.
    pub fn merge<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        f(&mut lock(&self.inner))
    }

    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        lock(&self.inner).clone()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Scanner ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegionScanner {
    threads: usize,
    label:   String,
}

impl Default for RegionScanner {
    fn default() -> Self {
        Self { threads: default_threads(), label: "regions".into() }
    }
}

/// Available hardware parallelism, or 1 when it cannot be determined.
pub fn default_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl RegionScanner {
    /// `threads == 0` selects the available hardware parallelism.
    pub fn new(threads: usize) -> Self {
        Self { threads: if threads == 0 { default_threads() } else { threads }, ..Self::default() }
    }

    /// Prefix for progress log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` once per task and wait for all of them.
    pub fn run<T, R, E, F>(&self, tasks: Vec<(RegionPos, T)>, work: F) -> Result<ScanOutcome<R, E>, ScanError>
    where
        T: Send,
        R: Send,
        E: Send,
        F: Fn(RegionPos, T) -> Result<R, E> + Sync,
    {
        let progress = Progress::new(self.label.clone(), tasks.len());
        let one = |(pos, task): (RegionPos, T)| {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| work(pos, task))) {
                Ok(Ok(r))   => Ok(r),
                Ok(Err(e))  => Err(TaskError::Failed(e)),
                Err(panic)  => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
            };
            progress.tick();
            (pos, result)
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("region-scan-{i}"))
                .build()
                .map_err(|e| ScanError::Pool(e.to_string()))?;
            log::debug!("{}: {} task(s) on {} thread(s)", self.label, tasks.len(), self.threads);
            Ok(pool.install(|| tasks.into_par_iter().map(one).collect()))
        }

        #[cfg(not(feature = "parallel"))]
        {
            Ok(tasks.into_iter().map(one).collect())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tasks(n: i32) -> Vec<(RegionPos, i32)> {
        (0..n).map(|i| (RegionPos::new(i, -i), i)).collect()
    }

    #[test]
    fn every_region_gets_its_own_result() {
        let scanner = RegionScanner::new(4);
        let out = scanner.run(tasks(20), |pos, n| Ok::<_, String>(pos.x * 10 + n)).unwrap();
        assert_eq!(out.len(), 20);
        for (pos, r) in out {
            assert_eq!(r.unwrap(), pos.x * 11);
        }
    }

    #[test]
    fn failures_and_panics_are_values() {
        let scanner = RegionScanner::new(2);
        let out = scanner
            .run(tasks(6), |_, n| match n {
                2 => Err(format!("bad {n}")),
                4 => panic!("boom"),
                _ => Ok(n),
            })
            .unwrap();
        assert_eq!(out.len(), 6);
        assert!(matches!(&out[&RegionPos::new(2, -2)], Err(TaskError::Failed(m)) if m == "bad 2"));
        assert!(matches!(&out[&RegionPos::new(4, -4)], Err(TaskError::Panicked(m)) if m == "boom"));
        assert_eq!(out.values().filter(|r| r.is_ok()).count(), 4);
    }

    #[test]
    fn accumulator_merges_from_workers() {
        let acc: Accumulator<BTreeSet<i32>> = Accumulator::new(BTreeSet::new());
        let scanner = RegionScanner::new(3);
        scanner
            .run(tasks(12), |_, n| {
                let partial: Vec<i32> = (0..5).map(|k| n % 4 + k).collect();
                acc.merge(|set| set.extend(partial));
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(acc.snapshot(), (0..8).collect::<BTreeSet<i32>>());
        assert_eq!(acc.into_inner().len(), 8);
    }

    #[test]
    fn progress_counts_to_total() {
        let progress = Progress::new("test", 3);
        assert_eq!(progress.tick(), 1);
        progress.tick();
        assert_eq!(progress.tick(), 3);
        assert_eq!(progress.done(), 3);
    }

    #[test]
    fn zero_threads_means_hardware_parallelism() {
        assert_eq!(RegionScanner::new(0).threads(), default_threads());
        assert!(RegionScanner::new(0).run(Vec::<(RegionPos, ())>::new(), |_, _| Ok::<_, ()>(())).unwrap().is_empty());
    }
}
