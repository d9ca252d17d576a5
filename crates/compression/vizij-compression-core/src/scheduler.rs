//! Build scheduler: admission, concurrency cap, memory budget and per-asset jobs.
//!
//! Jobs move `Queued -> Active -> Completed | Cancelled`. At most one job exists
//! per asset. Active jobs run on the cache's workers and hold a budget
//! reservation; queued jobs may hold one if the budget allowed it at enqueue time.
//! Every reservation is a `Reservation` token, so it is released exactly once
//! whichever way the job ends.
//!
//! The scheduler is driven cooperatively: `tick` polls and promotes within a time
//! slice, `wait` is the only call that blocks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::asset::{AssetHandle, BuildOutcome, BuildSink};
use crate::budget::{MemoryBudget, Reservation};
use crate::cache::{Blob, BuildFn, CacheJobHandle, ContentAddressableCache};
use crate::codec::Compressor;
use crate::compressible::CompressibleData;
use crate::config::{CompressionConfig, QueuePolicy};
use crate::diagnostics::SchedulerDiagnostics;
use crate::error::BuildError;
use crate::key::{CacheKey, CacheKeyBuilder};

/// One unit of work: prepared data, its key and the codec to run.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub asset: AssetHandle,
    pub key: CacheKey,
    pub data: Arc<CompressibleData>,
    pub codec: Arc<dyn Compressor>,
    pub estimate_bytes: u64,
}

impl BuildRequest {
    /// Derive the key and size estimate for `data`.
    pub fn new(
        asset: AssetHandle,
        data: CompressibleData,
        codec: Arc<dyn Compressor>,
        key_builder: &CacheKeyBuilder,
    ) -> Self {
        let key = key_builder.build(&data, codec.as_ref());
        let estimate_bytes = codec.estimate_build_bytes(&data);
        Self {
            asset,
            key,
            data: Arc::new(data),
            codec,
            estimate_bytes,
        }
    }

    fn build_fn(&self) -> BuildFn {
        let data = self.data.clone();
        let codec = self.codec.clone();
        Box::new(move || codec.compress(&data))
    }
}

/// What `request_build` did with a request.
///
/// A `Completed` result has already been delivered to the sink; the ticket carries
/// a copy for the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildTicket {
    Completed(Result<Blob, BuildError>),
    Active,
    Queued,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobPhase {
    Queued,
    Active,
}

/// Summary of one `tick`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub finished: usize,
    pub promoted: usize,
    pub active: usize,
    pub queued: usize,
    /// The time slice ran out with work left over.
    pub exhausted: bool,
}

struct QueuedJob {
    request: BuildRequest,
    reservation: Option<Reservation>,
}

struct ActiveJob {
    asset: AssetHandle,
    key: CacheKey,
    cache_job: CacheJobHandle,
    reservation: Option<Reservation>,
}

pub struct BuildScheduler {
    cache: Arc<dyn ContentAddressableCache>,
    budget: MemoryBudget,
    concurrency_cap: usize,
    policy: QueuePolicy,
    time_slice: Duration,
    queued: VecDeque<QueuedJob>,
    active: Vec<ActiveJob>,
    diagnostics: SchedulerDiagnostics,
}

impl BuildScheduler {
    pub fn new(
        config: &CompressionConfig,
        cache: Arc<dyn ContentAddressableCache>,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self {
            cache,
            budget: MemoryBudget::new(config.memory_budget_bytes),
            concurrency_cap: config.concurrency_cap,
            policy: config.queue_policy,
            time_slice: Duration::from_millis(config.tick_time_slice_ms),
            queued: VecDeque::new(),
            active: Vec::new(),
            diagnostics: SchedulerDiagnostics::default(),
        })
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn diagnostics(&self) -> SchedulerDiagnostics {
        let mut d = self.diagnostics.clone();
        d.peak_reserved_bytes = self.budget.peak();
        d
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn job_phase(&self, asset: AssetHandle) -> Option<JobPhase> {
        if self.active.iter().any(|j| j.asset == asset) {
            Some(JobPhase::Active)
        } else if self.queued.iter().any(|j| j.request.asset == asset) {
            Some(JobPhase::Queued)
        } else {
            None
        }
    }

    pub fn request_build(
        &mut self,
        request: BuildRequest,
        is_async: bool,
        sink: &mut dyn BuildSink,
    ) -> BuildTicket {
        self.diagnostics.requested += 1;
        let asset = request.asset;

        if let Some(pos) = self.queued.iter().position(|j| j.request.asset == asset) {
            if let Some(old) = self.queued.remove(pos) {
                debug!("{asset}: queued build {} superseded", old.request.key);
                self.diagnostics.superseded += 1;
            }
        }
        if let Some(pos) = self.active.iter().position(|j| j.asset == asset) {
            let job = self.active.swap_remove(pos);
            debug!("{asset}: waiting for active build {} before a new request", job.key);
            self.finish_blocking(job, sink);
        }

        match self.cache.get_sync(&request.key) {
            Ok(Some(blob)) => {
                debug!("{asset}: cache hit {}", request.key);
                self.diagnostics.cache_hits += 1;
                return self.complete(asset, request.key, Ok(blob), sink);
            }
            Ok(None) => {}
            Err(e) => {
                let err = BuildError::from_cache(request.key.as_str(), e);
                return self.complete(asset, request.key, Err(err), sink);
            }
        }

        if !is_async {
            return self.build_now(request, sink);
        }
        if request.estimate_bytes > self.budget.limit() {
            info!(
                "{asset}: estimate {} exceeds the whole budget {}; building synchronously",
                request.estimate_bytes,
                self.budget.limit()
            );
            self.diagnostics.budget_fallbacks += 1;
            return self.build_now(request, sink);
        }

        if self.active.len() < self.concurrency_cap {
            let Some(reservation) = self.reserve_with_reclaim(request.estimate_bytes, sink) else {
                info!(
                    "{asset}: budget short ({} of {} available, need {}); building synchronously",
                    self.budget.available(),
                    self.budget.limit(),
                    request.estimate_bytes
                );
                self.diagnostics.budget_fallbacks += 1;
                return self.build_now(request, sink);
            };
            return match self.launch(request, Some(reservation), sink) {
                Ok(job) => {
                    self.active.push(job);
                    BuildTicket::Active
                }
                Err(e) => BuildTicket::Completed(Err(e)),
            };
        }

        let reservation = self.budget.try_reserve(request.estimate_bytes);
        debug!(
            "{asset}: at concurrency cap {}; queued (reserved: {})",
            self.concurrency_cap,
            reservation.is_some()
        );
        self.queued.push_back(QueuedJob {
            request,
            reservation,
        });
        BuildTicket::Queued
    }

    /// Poll active jobs, deliver finished results and promote queued jobs, all
    /// within the configured time slice. Each tick polls at least one active job
    /// and attempts at least one promotion, so a short slice still makes progress;
    /// whatever is left over resumes on the next tick.
    pub fn tick(&mut self, sink: &mut dyn BuildSink) -> TickReport {
        let deadline = Instant::now() + self.time_slice;
        let mut report = TickReport::default();

        let mut i = 0;
        let mut polled = 0;
        while i < self.active.len() {
            if polled > 0 && Instant::now() >= deadline {
                report.exhausted = true;
                break;
            }
            polled += 1;
            if self.poll_one(i, sink) {
                report.finished += 1;
            } else {
                i += 1;
            }
        }

        let mut attempted = false;
        while self.active.len() < self.concurrency_cap && !self.queued.is_empty() {
            if attempted && Instant::now() >= deadline {
                report.exhausted = true;
                break;
            }
            attempted = true;
            let Some(idx) = self.next_promotable() else {
                break;
            };
            let Some(job) = self.queued.remove(idx) else {
                break;
            };
            debug!("{}: promoting {}", job.request.asset, job.request.key);
            if let Ok(active) = self.launch(job.request, job.reservation, sink) {
                self.active.push(active);
                report.promoted += 1;
            }
        }

        report.active = self.active.len();
        report.queued = self.queued.len();
        report
    }

    /// Block until the job for `asset` finishes and deliver its result. A queued
    /// job is started first (synchronously if the budget cannot cover it).
    /// Returns `false` if the asset has no job.
    pub fn wait(&mut self, asset: AssetHandle, sink: &mut dyn BuildSink) -> bool {
        if let Some(pos) = self.active.iter().position(|j| j.asset == asset) {
            let job = self.active.swap_remove(pos);
            self.finish_blocking(job, sink);
            return true;
        }
        let Some(pos) = self.queued.iter().position(|j| j.request.asset == asset) else {
            return false;
        };
        let Some(job) = self.queued.remove(pos) else {
            return false;
        };
        let reservation = job
            .reservation
            .or_else(|| self.budget.try_reserve(job.request.estimate_bytes));
        if reservation.is_none() {
            self.diagnostics.budget_fallbacks += 1;
            self.build_now(job.request, sink);
            return true;
        }
        if let Ok(active) = self.launch(job.request, reservation, sink) {
            self.finish_blocking(active, sink);
        }
        true
    }

    /// Remove a job that has not started. Returns `false` if the asset has no
    /// queued job; active jobs cannot be cancelled.
    pub fn cancel_if_not_started(&mut self, asset: AssetHandle) -> bool {
        let Some(pos) = self.queued.iter().position(|j| j.request.asset == asset) else {
            return false;
        };
        match self.queued.remove(pos) {
            Some(job) => {
                debug!(
                    "{asset}: cancelled {} (released {} bytes)",
                    job.request.key,
                    job.reservation.as_ref().map_or(0, Reservation::bytes)
                );
                self.diagnostics.cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Drop queued jobs and wait for active ones without delivering their results.
    pub fn shutdown(&mut self) {
        if self.queued.is_empty() && self.active.is_empty() {
            return;
        }
        info!(
            "build scheduler shutting down: {} queued dropped, {} active awaited",
            self.queued.len(),
            self.active.len()
        );
        self.diagnostics.cancelled += self.queued.len() as u64;
        self.queued.clear();
        for job in self.active.drain(..) {
            if let Err(e) = self.cache.wait(job.cache_job) {
                debug!("{}: build ended during shutdown: {e}", job.asset);
            }
        }
    }

    fn reserve_with_reclaim(&mut self, bytes: u64, sink: &mut dyn BuildSink) -> Option<Reservation> {
        if let Some(r) = self.budget.try_reserve(bytes) {
            return Some(r);
        }
        let mut i = 0;
        while i < self.active.len() {
            if !self.poll_one(i, sink) {
                i += 1;
            }
        }
        self.budget.try_reserve(bytes)
    }

    /// First queued job in policy order that holds, or can now obtain, a reservation.
    fn next_promotable(&mut self) -> Option<usize> {
        let len = self.queued.len();
        for n in 0..len {
            let idx = match self.policy {
                QueuePolicy::Lifo => len - 1 - n,
                QueuePolicy::Fifo => n,
            };
            let job = &mut self.queued[idx];
            if job.reservation.is_none() {
                job.reservation = self.budget.try_reserve(job.request.estimate_bytes);
            }
            if job.reservation.is_some() {
                return Some(idx);
            }
        }
        None
    }

    fn launch(
        &mut self,
        request: BuildRequest,
        reservation: Option<Reservation>,
        sink: &mut dyn BuildSink,
    ) -> Result<ActiveJob, BuildError> {
        match self.cache.build_async(&request.key, request.build_fn()) {
            Ok(cache_job) => {
                self.diagnostics.async_started += 1;
                debug!(
                    "{}: async build {} started ({} bytes reserved)",
                    request.asset,
                    request.key,
                    reservation.as_ref().map_or(0, Reservation::bytes)
                );
                Ok(ActiveJob {
                    asset: request.asset,
                    key: request.key,
                    cache_job,
                    reservation,
                })
            }
            Err(e) => {
                let err = BuildError::from_cache(request.key.as_str(), e);
                drop(reservation);
                self.deliver(request.asset, request.key, Err(err.clone()), sink);
                Err(err)
            }
        }
    }

    fn build_now(&mut self, request: BuildRequest, sink: &mut dyn BuildSink) -> BuildTicket {
        self.diagnostics.sync_builds += 1;
        let result = self
            .cache
            .build_sync(&request.key, request.build_fn())
            .map_err(|e| BuildError::from_cache(request.key.as_str(), e));
        self.complete(request.asset, request.key, result, sink)
    }

    fn complete(
        &mut self,
        asset: AssetHandle,
        key: CacheKey,
        result: Result<Blob, BuildError>,
        sink: &mut dyn BuildSink,
    ) -> BuildTicket {
        self.deliver(asset, key, result.clone(), sink);
        BuildTicket::Completed(result)
    }

    /// Poll active job `i`; on completion remove it, release its budget and deliver.
    fn poll_one(&mut self, i: usize, sink: &mut dyn BuildSink) -> bool {
        let Some(result) = self.cache.poll(self.active[i].cache_job) else {
            return false;
        };
        let job = self.active.swap_remove(i);
        drop(job.reservation);
        let result = result.map_err(|e| BuildError::from_cache(job.key.as_str(), e));
        self.deliver(job.asset, job.key, result, sink);
        true
    }

    fn finish_blocking(&mut self, job: ActiveJob, sink: &mut dyn BuildSink) {
        let result = self
            .cache
            .wait(job.cache_job)
            .map_err(|e| BuildError::from_cache(job.key.as_str(), e));
        drop(job.reservation);
        self.deliver(job.asset, job.key, result, sink);
    }

    fn deliver(
        &mut self,
        asset: AssetHandle,
        key: CacheKey,
        result: Result<Blob, BuildError>,
        sink: &mut dyn BuildSink,
    ) {
        match &result {
            Ok(blob) => {
                debug!("{asset}: build {key} finished ({} bytes)", blob.len());
                self.diagnostics.completed += 1;
            }
            Err(e @ BuildError::CacheRetrievalFailed { .. }) => {
                error!("{asset}: {e}");
                self.diagnostics.retrieval_failures += 1;
            }
            Err(e) => {
                warn!("{asset}: build {key} failed: {e}");
                self.diagnostics.failed += 1;
            }
        }
        if !sink.apply(BuildOutcome { asset, key, result }) {
            self.diagnostics.discarded += 1;
        }
    }
}

impl Drop for BuildScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
