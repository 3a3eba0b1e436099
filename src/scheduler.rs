//! Thread-pool scheduler used by solvers and gravity evaluation.
//!
//! Wraps a rayon pool and exposes chunked parallel loops with configurable
//! granularity (particles per task). A sequential variant exists for tests
//! and for debugging nondeterminism suspicions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::settings::{RunSettings, RunSettingsId};

pub struct Scheduler {
    pool: Option<rayon::ThreadPool>,
    granularity: usize,
    abort: Arc<AtomicBool>,
}

impl Scheduler {
    /// Creates a scheduler with the given worker count; zero workers
    /// selects the hardware thread count.
    pub fn new(thread_cnt: usize, granularity: usize) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if thread_cnt > 0 {
            builder = builder.num_threads(thread_cnt);
        }
        let pool = builder
            .build()
            .map_err(|e| crate::error::Error::InvalidSetup(e.to_string()))?;
        Ok(Self {
            pool: Some(pool),
            granularity: granularity.max(1),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        let threads = settings.get::<i64>(RunSettingsId::RunThreadCnt)?;
        let granularity = settings.get::<i64>(RunSettingsId::RunThreadGranularity)?;
        Self::new(threads.max(0) as usize, granularity.max(1) as usize)
    }

    /// Scheduler running everything on the calling thread.
    pub fn sequential() -> Self {
        Self {
            pool: None,
            granularity: usize::MAX,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn granularity(&self) -> usize {
        self.granularity
    }

    /// Shared cancellation flag; polled at task boundaries by the run loop
    /// and the solvers.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn should_abort(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Evaluates `func` for every index of the range and collects the
    /// results in order. Tasks receive disjoint chunks of at least the
    /// configured granularity.
    pub fn map_collect<T, F>(&self, n: usize, func: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .with_min_len(self.granularity)
                    .map(|i| func(i))
                    .collect()
            }),
            None => (0..n).map(func).collect(),
        }
    }

    /// Invokes `func` with disjoint index ranges covering [0, n); no
    /// ordering guarantee across tasks.
    pub fn parallel_for<F>(&self, n: usize, func: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        match &self.pool {
            Some(pool) => {
                let chunk = self.granularity;
                let task_cnt = n.div_ceil(chunk);
                pool.install(|| {
                    (0..task_cnt).into_par_iter().for_each(|task| {
                        let begin = task * chunk;
                        let end = (begin + chunk).min(n);
                        func(begin, end);
                    });
                });
            }
            None => func(0, n),
        }
    }

    /// Parallel fold with per-thread accumulators, merged at the end. The
    /// merge order is unspecified; accumulators must be commutative.
    pub fn fold_reduce<A, I, F, M>(&self, n: usize, identity: I, fold: F, merge: M) -> A
    where
        A: Send,
        I: Fn() -> A + Sync + Send,
        F: Fn(A, usize) -> A + Sync + Send,
        M: Fn(A, A) -> A + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .with_min_len(self.granularity)
                    .fold(&identity, |acc, i| fold(acc, i))
                    .reduce(&identity, |a, b| merge(a, b))
            }),
            None => (0..n).fold(identity(), fold),
        }
    }
}
