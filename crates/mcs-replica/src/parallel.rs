use mcs_core::errors::ErrorInfo;
use mcs_core::McsError;
use rayon::prelude::*;

use crate::config::Execution;

/// Runs per-replica work serially or on a rayon pool owned by a coordinator.
#[derive(Debug)]
pub struct Executor {
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    /// Builds the pool requested by `execution`.
    pub fn new(execution: &Execution) -> Result<Self, McsError> {
        let pool = match execution {
            Execution::Serial => None,
            Execution::Parallel { threads } => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads((*threads).max(1))
                    .build()
                    .map_err(|err| {
                        McsError::Config(
                            ErrorInfo::new("thread-pool", err.to_string())
                                .with_context("threads", threads),
                        )
                    })?,
            ),
        };
        Ok(Self { pool })
    }

    /// Worker threads available to a batch (1 when serial).
    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, rayon::ThreadPool::current_num_threads)
    }

    /// Applies `work` to every item and returns once all items are done.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], work: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        match &self.pool {
            None => items.iter_mut().for_each(work),
            Some(pool) => pool.install(|| items.par_iter_mut().for_each(work)),
        }
    }
}
