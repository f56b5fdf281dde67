// parallel.rs -- Blocking data-parallel helpers over a dedicated pool.
//
// Every call blocks the caller until all elements are done. Output order
// always follows input order (map slots match input indices; filter keeps
// survivors in their original relative order), whatever order the workers
// finish in. A panic inside a worker propagates to the caller once the
// batch unwinds.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Result, TldError};

/// Fixed-size worker pool shared by the classifier and the detector.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Start a pool with `threads` workers, or one per available core when
    /// `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("tld-worker-{i}"));
        if let Some(n) = threads {
            if n == 0 {
                return Err(TldError::config("worker_threads must be at least 1"));
            }
            builder = builder.num_threads(n);
        }
        let pool = builder.build().map_err(|e| TldError::WorkerPool(e.to_string()))?;
        Ok(WorkerPool { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Apply `f` to every item; `out[i] == f(&items[i])`.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }

    /// Keep the items for which `keep` holds, in input order.
    pub fn filter<T, F>(&self, items: Vec<T>, keep: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&T) -> bool + Sync + Send,
    {
        self.pool.install(|| items.into_par_iter().filter(|item| keep(item)).collect())
    }

    pub fn for_each<T, F>(&self, items: &[T], f: F)
    where
        T: Sync,
        F: Fn(&T) + Sync + Send,
    {
        self.pool.install(|| items.par_iter().for_each(f))
    }

    /// Fallible map. Every element runs to completion; afterwards the
    /// first error in input order, if any, is returned.
    pub fn try_map<T, R, E, F>(&self, items: &[T], f: F) -> std::result::Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> std::result::Result<R, E> + Sync + Send,
    {
        let results: Vec<std::result::Result<R, E>> = self.map(items, f);
        results.into_iter().collect()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("threads", &self.threads()).finish()
    }
}
