//! Shared thread pool for parallel extraction and aggregation.
//!
//! Every parallel section in the crate runs inside the same pool so nested
//! use from a caller's own rayon pool does not oversubscribe the machine.

#[cfg(feature = "parallel")]
use rayon::ThreadPool;

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
static THREAD_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Environment variable capping the worker count.
pub const THREADS_ENV: &str = "OVERHEAD_THREADS";

/// Get or initialize the shared pool.
///
/// Worker count is the number of logical CPUs unless `OVERHEAD_THREADS` is
/// set. Returns `None` when the pool could not be built; callers then run on
/// rayon's global pool.
#[cfg(feature = "parallel")]
pub fn get_thread_pool() -> Option<&'static ThreadPool> {
    THREAD_POOL
        .get_or_init(|| {
            let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("overhead-{i}"));
            if let Some(n) = std::env::var(THREADS_ENV).ok().and_then(|v| v.parse::<usize>().ok()) {
                builder = builder.num_threads(n);
            }
            match builder.build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to the global rayon pool");
                    None
                }
            }
        })
        .as_ref()
}

/// Execute a parallel operation in the shared pool.
#[cfg(feature = "parallel")]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match get_thread_pool() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Execute `op` directly.
#[cfg(not(feature = "parallel"))]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R,
{
    op()
}
