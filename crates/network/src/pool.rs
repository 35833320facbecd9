//! # Event Loop Pool
//!
//! Owns the tokio runtime that drives every connection task.
//!
//! The runtime is created lazily on first use and torn down exactly once.
//! There is no global instance: the binary constructs a pool and hands it
//! to whatever needs to spawn work.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ handle() / block_on() (first call builds the runtime) ──▶ shutdown()
//!                                                                     │
//!                                           later calls fail with PoolShutdown
//! ```

use cobble_core::{ProtocolError, Result};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::ServerConfig;

/// How long `shutdown` waits for in-flight tasks
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct EventLoopPool {
    thread_name: String,
    worker_threads: usize,
    runtime: RwLock<Option<Arc<Runtime>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for EventLoopPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopPool")
            .field("thread_name", &self.thread_name)
            .field("worker_threads", &self.worker_threads)
            .field("started", &self.is_started())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl EventLoopPool {
    /// Create a pool. Nothing is started until the first `handle()` call.
    ///
    /// # Arguments
    /// * `thread_name` - Name given to worker threads
    /// * `worker_threads` - Number of workers, 0 for one per core
    pub fn new(thread_name: impl Into<String>, worker_threads: usize) -> Self {
        Self {
            thread_name: thread_name.into(),
            worker_threads,
            runtime: RwLock::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create a pool sized by `config.worker_threads`
    pub fn for_config(thread_name: impl Into<String>, config: &ServerConfig) -> Self {
        Self::new(thread_name, config.worker_threads)
    }

    /// Configured worker count, 0 for one per core
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    fn runtime(&self) -> Result<Arc<Runtime>> {
        if self.is_shut_down() {
            return Err(ProtocolError::PoolShutdown);
        }

        if let Some(runtime) = self.runtime.read().as_ref() {
            return Ok(Arc::clone(runtime));
        }

        let mut slot = self.runtime.write();
        // Re-check under the write lock: another caller may have won the race,
        // or shutdown may have run in between
        if self.is_shut_down() {
            return Err(ProtocolError::PoolShutdown);
        }
        if let Some(runtime) = slot.as_ref() {
            return Ok(Arc::clone(runtime));
        }

        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(self.thread_name.clone());
        if self.worker_threads > 0 {
            builder.worker_threads(self.worker_threads);
        }
        let runtime = Arc::new(builder.build()?);

        tracing::info!(
            "Started event loop pool '{}' ({} workers)",
            self.thread_name,
            if self.worker_threads == 0 {
                "auto".to_string()
            } else {
                self.worker_threads.to_string()
            }
        );

        *slot = Some(Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Handle for spawning onto the pool, starting it if needed
    ///
    /// # Errors
    /// `PoolShutdown` once `shutdown` has been called.
    pub fn handle(&self) -> Result<Handle> {
        Ok(self.runtime()?.handle().clone())
    }

    /// Run a future to completion on the pool
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let runtime = self.runtime()?;
        Ok(runtime.block_on(future))
    }

    pub fn is_started(&self) -> bool {
        self.runtime.read().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the pool
    ///
    /// Safe to call from several threads at once. Only the first call does
    /// the work and returns `true`; every later call returns `false`.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }

        let runtime = self.runtime.write().take();
        match runtime.map(Arc::try_unwrap) {
            Some(Ok(runtime)) => {
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
                tracing::info!("Event loop pool '{}' shut down", self.thread_name);
            }
            Some(Err(_in_use)) => {
                tracing::debug!(
                    "Event loop pool '{}' still in use, runtime stops when released",
                    self.thread_name
                );
            }
            None => tracing::debug!("Event loop pool '{}' was never started", self.thread_name),
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_lazy_start() {
        let pool = EventLoopPool::new("test-pool", 2);
        assert!(!pool.is_started());

        let value = pool.block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
        assert!(pool.is_started());

        // The same runtime is reused
        let handle = pool.handle().unwrap();
        let joined = pool.block_on(handle.spawn(async { "spawned" })).unwrap();
        assert_eq!(joined.unwrap(), "spawned");

        assert!(pool.shutdown());
    }

    #[test]
    fn test_concurrent_shutdown_is_idempotent() {
        let pool = EventLoopPool::new("test-pool", 1);
        pool.handle().unwrap();

        let winners = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if pool.shutdown() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(pool.is_shut_down());
        assert!(!pool.is_started());
    }

    #[test]
    fn test_use_after_shutdown_fails() {
        let pool = EventLoopPool::new("test-pool", 1);
        assert!(pool.shutdown());
        assert!(!pool.shutdown());

        assert!(matches!(pool.handle(), Err(ProtocolError::PoolShutdown)));
        assert!(matches!(pool.block_on(async {}), Err(ProtocolError::PoolShutdown)));
        assert!(!pool.is_started());
    }

    #[test]
    fn test_sized_from_server_config() {
        let config = ServerConfig {
            worker_threads: 3,
            ..Default::default()
        };
        let pool = EventLoopPool::for_config("test-pool", &config);
        assert_eq!(pool.worker_threads(), 3);

        let workers = pool.block_on(async { Handle::current().metrics().num_workers() });
        assert_eq!(workers.unwrap(), 3);
        assert!(pool.shutdown());
    }
}
