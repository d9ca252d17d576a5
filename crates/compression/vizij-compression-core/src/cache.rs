//! Content-addressable cache interface and an in-memory implementation.
//!
//! A cache maps `CacheKey`s to compressed blobs. On a miss the caller hands the
//! cache a build closure, run either in the caller's context (`build_sync`) or on
//! the cache's own workers (`build_async` + `poll`/`wait`). Results distinguish a
//! codec failure (`CacheError::BuildFailed`) from the cache failing to produce a
//! result at all (`CacheError::Retrieval`).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::codec::CompressedBlob;
use crate::error::{CacheError, CompressionError};
use crate::key::CacheKey;
use crate::workers::Workers;

pub type Blob = Arc<Vec<u8>>;

pub type BuildFn = Box<dyn FnOnce() -> Result<CompressedBlob, CompressionError> + Send + 'static>;

/// Ticket for an asynchronous build.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheJobHandle(pub u64);

pub trait ContentAddressableCache: Send + Sync {
    /// Look up `key`. `Ok(None)` is a miss.
    fn get_sync(&self, key: &CacheKey) -> Result<Option<Blob>, CacheError>;

    /// Build in the caller's context and store the result.
    fn build_sync(&self, key: &CacheKey, build: BuildFn) -> Result<Blob, CacheError>;

    /// Start a build on the cache's workers.
    fn build_async(&self, key: &CacheKey, build: BuildFn) -> Result<CacheJobHandle, CacheError>;

    /// Non-blocking completion check. Returns the result once; the handle is spent after.
    fn poll(&self, job: CacheJobHandle) -> Option<Result<Blob, CacheError>>;

    /// Block until the job finishes. The handle is spent after.
    fn wait(&self, job: CacheJobHandle) -> Result<Blob, CacheError>;
}

#[derive(Default)]
struct JobSlot {
    result: Mutex<Option<Result<Blob, CacheError>>>,
    ready: Condvar,
}

impl JobSlot {
    fn complete(&self, result: Result<Blob, CacheError>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }
}

fn run_build(build: BuildFn) -> Result<Vec<u8>, CacheError> {
    match panic::catch_unwind(AssertUnwindSafe(build)) {
        Ok(Ok(blob)) => Ok(blob.into_bytes()),
        Ok(Err(e)) => Err(CacheError::BuildFailed(e)),
        Err(_) => Err(CacheError::Retrieval {
            reason: "build closure panicked".into(),
        }),
    }
}

type Entries = Arc<RwLock<HashMap<CacheKey, Blob>>>;

/// In-process cache backed by a map and a worker pool.
pub struct MemoryCache {
    entries: Entries,
    jobs: Mutex<HashMap<u64, Arc<JobSlot>>>,
    next_job: AtomicU64,
    workers: Workers,
}

impl MemoryCache {
    pub fn new(worker_threads: usize) -> Result<Self, CacheError> {
        let workers =
            Workers::new(worker_threads.max(1), "vizij-compress").map_err(|e| CacheError::Retrieval {
                reason: format!("failed to start cache workers: {e}"),
            })?;
        Ok(Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            jobs: Mutex::new(HashMap::new()),
            next_job: AtomicU64::new(0),
            workers,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of asynchronous jobs whose result has not been collected.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.lock().len()
    }

    fn store(entries: &Entries, key: &CacheKey, bytes: Vec<u8>) -> Blob {
        let blob = Arc::new(bytes);
        entries.write().insert(key.clone(), blob.clone());
        blob
    }

    fn take_slot(&self, job: CacheJobHandle) -> Option<Arc<JobSlot>> {
        self.jobs.lock().remove(&job.0)
    }
}

impl ContentAddressableCache for MemoryCache {
    fn get_sync(&self, key: &CacheKey) -> Result<Option<Blob>, CacheError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn build_sync(&self, key: &CacheKey, build: BuildFn) -> Result<Blob, CacheError> {
        let bytes = run_build(build)?;
        log::debug!("cache: stored {} ({} bytes, sync)", key, bytes.len());
        Ok(Self::store(&self.entries, key, bytes))
    }

    fn build_async(&self, key: &CacheKey, build: BuildFn) -> Result<CacheJobHandle, CacheError> {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(JobSlot::default());
        self.jobs.lock().insert(id, slot.clone());

        let entries = self.entries.clone();
        let key = key.clone();
        self.workers.execute(move || {
            let result = run_build(build).map(|bytes| {
                log::debug!("cache: stored {} ({} bytes, async)", key, bytes.len());
                MemoryCache::store(&entries, &key, bytes)
            });
            slot.complete(result);
        });
        Ok(CacheJobHandle(id))
    }

    fn poll(&self, job: CacheJobHandle) -> Option<Result<Blob, CacheError>> {
        let mut jobs = self.jobs.lock();
        let Some(slot) = jobs.get(&job.0) else {
            return Some(Err(CacheError::Retrieval {
                reason: format!("unknown cache job {}", job.0),
            }));
        };
        let result = slot.result.lock().take()?;
        jobs.remove(&job.0);
        Some(result)
    }

    fn wait(&self, job: CacheJobHandle) -> Result<Blob, CacheError> {
        let Some(slot) = self.take_slot(job) else {
            return Err(CacheError::Retrieval {
                reason: format!("unknown cache job {}", job.0),
            });
        };
        let mut result = slot.result.lock();
        loop {
            if let Some(r) = result.take() {
                return r;
            }
            slot.ready.wait(&mut result);
        }
    }
}
