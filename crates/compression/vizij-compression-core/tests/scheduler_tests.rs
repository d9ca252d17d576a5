mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{biped, init_logging, request, ManualCache, RecordingSink};
use vizij_compression::{
    AssetArena, AssetHandle, BuildError, BuildScheduler, BuildTicket, CompressionConfig, JobPhase,
    QueuePolicy,
};

fn scheduler(cap: usize, budget: u64, policy: QueuePolicy) -> (BuildScheduler, Arc<ManualCache>) {
    init_logging();
    let cfg = CompressionConfig {
        concurrency_cap: cap,
        memory_budget_bytes: budget,
        queue_policy: policy,
        tick_time_slice_ms: 1_000,
        ..CompressionConfig::default()
    };
    let cache = Arc::new(ManualCache::new());
    let sched = BuildScheduler::new(&cfg, cache.clone()).expect("valid config");
    (sched, cache)
}

fn handles(n: usize) -> Vec<AssetHandle> {
    let mut arena = AssetArena::new();
    (0..n).map(|_| arena.insert(())).collect()
}

#[test]
fn cap_two_budget_hundred_three_forty_byte_jobs() {
    let skel = biped();
    let (mut sched, cache) = scheduler(2, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(3);

    assert_eq!(sched.request_build(request(&skel, h[0], 1.0, 40), true, &mut sink), BuildTicket::Active);
    assert_eq!(sched.request_build(request(&skel, h[1], 2.0, 40), true, &mut sink), BuildTicket::Active);
    assert_eq!(sched.request_build(request(&skel, h[2], 3.0, 40), true, &mut sink), BuildTicket::Queued);

    assert_eq!(sched.active_len(), 2);
    assert_eq!(sched.queued_len(), 1);
    assert_eq!(sched.budget().reserved(), 80);
    assert!(sched.budget().reserved() <= sched.budget().limit());

    // C never obtained a reservation, so cancelling it releases nothing
    assert!(sched.cancel_if_not_started(h[2]));
    assert_eq!(sched.budget().reserved(), 80);
    assert!(!sched.cancel_if_not_started(h[2]));
    assert_eq!(sched.diagnostics().cancelled, 1);

    cache.complete_all();
    let report = sched.tick(&mut sink);
    assert_eq!(report.finished, 2);
    assert_eq!(sched.budget().reserved(), 0);
    assert_eq!(sched.diagnostics().peak_reserved_bytes, 80);
    assert!(sink.outcomes.iter().all(|o| o.result.is_ok()));
}

#[test]
fn cancelling_a_reserved_queued_job_releases_its_bytes_once() {
    let skel = biped();
    let (mut sched, cache) = scheduler(1, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(2);

    assert_eq!(sched.request_build(request(&skel, h[0], 1.0, 30), true, &mut sink), BuildTicket::Active);
    assert_eq!(sched.request_build(request(&skel, h[1], 2.0, 30), true, &mut sink), BuildTicket::Queued);
    // the queued job fit the budget at enqueue and holds its own reservation
    assert_eq!(sched.budget().reserved(), 60);

    assert!(sched.cancel_if_not_started(h[1]));
    assert_eq!(sched.budget().reserved(), 30);
    assert!(!sched.cancel_if_not_started(h[1]));
    assert_eq!(sched.budget().reserved(), 30);
    assert_eq!(sched.job_phase(h[1]), None);

    cache.complete_all();
    sched.tick(&mut sink);
    assert_eq!(sched.budget().reserved(), 0);
    assert_eq!(sink.assets(), vec![h[0]]);
    assert_eq!(sched.diagnostics().cancelled, 1);
}

#[test]
fn zero_time_slice_is_rejected() {
    let cfg = CompressionConfig {
        tick_time_slice_ms: 0,
        ..CompressionConfig::default()
    };
    let err = BuildScheduler::new(&cfg, Arc::new(ManualCache::new())).err();
    assert!(matches!(err, Some(BuildError::InvalidConfiguration { .. })));
}

#[test]
fn exhausted_time_slice_resumes_on_the_next_tick() {
    init_logging();
    let skel = biped();
    let cfg = CompressionConfig {
        concurrency_cap: 2,
        memory_budget_bytes: 100,
        tick_time_slice_ms: 1,
        ..CompressionConfig::default()
    };
    let cache = Arc::new(ManualCache::new());
    let mut sched = BuildScheduler::new(&cfg, cache.clone()).expect("valid config");
    let mut sink = RecordingSink::default();
    let h = handles(3);

    sched.request_build(request(&skel, h[0], 1.0, 40), true, &mut sink);
    sched.request_build(request(&skel, h[1], 2.0, 40), true, &mut sink);
    sched.request_build(request(&skel, h[2], 3.0, 40), true, &mut sink);
    cache.complete_all();
    // each poll outlasts the whole slice
    cache.set_poll_delay(Duration::from_millis(5));

    let first = sched.tick(&mut sink);
    assert_eq!(first.finished, 1);
    assert_eq!(first.promoted, 1);
    assert!(first.exhausted);
    assert_eq!(sched.active_len(), 2);
    assert_eq!(sched.budget().reserved(), 80);

    let second = sched.tick(&mut sink);
    assert_eq!(second.finished, 1);
    assert!(second.exhausted);
    assert_eq!(sched.budget().reserved(), 40);

    cache.set_poll_delay(Duration::ZERO);
    cache.complete_all();
    let third = sched.tick(&mut sink);
    assert_eq!(third.finished, 1);
    assert!(!third.exhausted);
    assert_eq!(sink.outcomes.len(), 3);
    assert_eq!(sched.budget().reserved(), 0);
}

#[test]
fn failed_launch_is_not_counted_as_a_promotion() {
    let skel = biped();
    let (mut sched, cache) = scheduler(1, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(2);

    sched.request_build(request(&skel, h[0], 1.0, 30), true, &mut sink);
    sched.request_build(request(&skel, h[1], 2.0, 30), true, &mut sink);
    cache.complete_all();
    cache.refuse_async(true);

    let report = sched.tick(&mut sink);
    assert_eq!(report.finished, 1);
    assert_eq!(report.promoted, 0);
    assert_eq!(report.active, 0);
    assert_eq!(report.queued, 0);
    // the refused job is reported to the sink and its reservation released
    assert_eq!(sink.assets(), vec![h[0], h[1]]);
    assert!(matches!(
        sink.outcomes[1].result,
        Err(BuildError::CacheRetrievalFailed { .. })
    ));
    assert_eq!(sched.budget().reserved(), 0);
}

#[test]
fn queued_job_is_promoted_once_budget_frees() {
    let skel = biped();
    let (mut sched, cache) = scheduler(2, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(3);

    let a = request(&skel, h[0], 1.0, 40);
    let a_key = a.key.clone();
    sched.request_build(a, true, &mut sink);
    sched.request_build(request(&skel, h[1], 2.0, 40), true, &mut sink);
    sched.request_build(request(&skel, h[2], 3.0, 40), true, &mut sink);

    cache.complete(&a_key);
    let report = sched.tick(&mut sink);
    assert_eq!(report.finished, 1);
    assert_eq!(report.promoted, 1);
    assert_eq!(sched.job_phase(h[2]), Some(JobPhase::Active));
    assert_eq!(sched.budget().reserved(), 80);

    cache.complete_all();
    sched.tick(&mut sink);
    assert_eq!(sink.outcomes.len(), 3);
    assert_eq!(sched.budget().reserved(), 0);
    assert!(sched.diagnostics().peak_reserved_bytes <= 100);
}

#[test]
fn lifo_promotes_newest_and_fifo_oldest() {
    let skel = biped();
    for (policy, expected) in [(QueuePolicy::Lifo, [0usize, 2, 1]), (QueuePolicy::Fifo, [0, 1, 2])] {
        let (mut sched, cache) = scheduler(1, 1_000, policy);
        let mut sink = RecordingSink::default();
        let h = handles(3);
        let keys: Vec<_> = (0..3)
            .map(|i| {
                let req = request(&skel, h[i], i as f32, 10);
                let key = req.key.clone();
                sched.request_build(req, true, &mut sink);
                key
            })
            .collect();

        for _ in 0..3 {
            cache.complete_all();
            sched.tick(&mut sink);
        }
        let expected_keys: Vec<_> = expected.iter().map(|&i| keys[i].clone()).collect();
        assert_eq!(cache.started(), expected_keys, "{policy:?}");
        assert_eq!(delivery_order(&h, &sink), expected.to_vec(), "{policy:?}");
    }
}

fn delivery_order(h: &[AssetHandle], sink: &RecordingSink) -> Vec<usize> {
    sink.assets()
        .iter()
        .filter_map(|a| h.iter().position(|x| x == a))
        .collect()
}

#[test]
fn one_job_per_asset_supersedes_queued_work() {
    let skel = biped();
    let (mut sched, cache) = scheduler(1, 1_000, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(2);

    sched.request_build(request(&skel, h[0], 0.0, 10), true, &mut sink);
    sched.request_build(request(&skel, h[1], 1.0, 10), true, &mut sink);
    let newer = request(&skel, h[1], 2.0, 10);
    let newer_key = newer.key.clone();
    assert_eq!(sched.request_build(newer, true, &mut sink), BuildTicket::Queued);
    assert_eq!(sched.queued_len(), 1);
    assert_eq!(sched.diagnostics().superseded, 1);

    cache.complete_all();
    sched.tick(&mut sink);
    cache.complete_all();
    sched.tick(&mut sink);
    assert_eq!(cache.started().last(), Some(&newer_key));
    assert_eq!(sink.outcomes.len(), 2);
}

#[test]
fn new_request_waits_for_the_active_job_of_the_same_asset() {
    let skel = biped();
    let (mut sched, _cache) = scheduler(2, 1_000, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(1);

    let first = request(&skel, h[0], 0.0, 10);
    let first_key = first.key.clone();
    assert_eq!(sched.request_build(first, true, &mut sink), BuildTicket::Active);
    assert_eq!(sched.request_build(request(&skel, h[0], 1.0, 10), true, &mut sink), BuildTicket::Active);

    // the first job was finished and delivered before the second started
    assert_eq!(sink.outcomes.len(), 1);
    assert_eq!(sink.outcomes[0].key, first_key);
    assert_eq!(sched.active_len(), 1);
    assert_eq!(sched.budget().reserved(), 10);
}

#[test]
fn wait_covers_active_and_queued_jobs() {
    let skel = biped();
    let (mut sched, _cache) = scheduler(1, 1_000, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(3);

    sched.request_build(request(&skel, h[0], 0.0, 10), true, &mut sink);
    sched.request_build(request(&skel, h[1], 1.0, 10), true, &mut sink);
    assert_eq!(sched.job_phase(h[1]), Some(JobPhase::Queued));

    assert!(sched.wait(h[1], &mut sink));
    assert_eq!(sink.assets(), vec![h[1]]);
    assert_eq!(sched.job_phase(h[1]), None);

    assert!(sched.wait(h[0], &mut sink));
    assert_eq!(sink.assets(), vec![h[1], h[0]]);
    assert!(!sched.wait(h[2], &mut sink));
    assert_eq!(sched.budget().reserved(), 0);
}

#[test]
fn synchronous_and_oversized_requests_complete_immediately() {
    let skel = biped();
    let (mut sched, cache) = scheduler(2, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(2);

    let sync = request(&skel, h[0], 0.0, 10);
    let sync_key = sync.key.clone();
    assert!(matches!(sched.request_build(sync, false, &mut sink), BuildTicket::Completed(Ok(_))));
    assert!(cache.contains(&sync_key));

    let big = request(&skel, h[1], 1.0, 1_000);
    assert!(matches!(sched.request_build(big, true, &mut sink), BuildTicket::Completed(Ok(_))));

    let d = sched.diagnostics();
    assert_eq!(d.sync_builds, 2);
    assert_eq!(d.budget_fallbacks, 1);
    assert_eq!(d.async_started, 0);
    assert_eq!(sched.budget().peak(), 0);

    // same content again is a cache hit
    assert!(matches!(
        sched.request_build(request(&skel, h[0], 0.0, 10), true, &mut sink),
        BuildTicket::Completed(Ok(_))
    ));
    assert_eq!(sched.diagnostics().cache_hits, 1);
}

#[test]
fn budget_shortfall_reclaims_then_falls_back() {
    let skel = biped();
    let (mut sched, cache) = scheduler(4, 100, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(3);

    let a = request(&skel, h[0], 0.0, 60);
    let a_key = a.key.clone();
    assert_eq!(sched.request_build(a, true, &mut sink), BuildTicket::Active);

    // A still running: no room, build in the caller's context
    let ticket = sched.request_build(request(&skel, h[1], 1.0, 60), true, &mut sink);
    assert!(matches!(ticket, BuildTicket::Completed(Ok(_))));
    assert_eq!(sched.diagnostics().budget_fallbacks, 1);

    // A finished but was never polled: reclaiming frees its reservation
    cache.complete(&a_key);
    let ticket = sched.request_build(request(&skel, h[2], 2.0, 60), true, &mut sink);
    assert_eq!(ticket, BuildTicket::Active);
    assert_eq!(sched.budget().reserved(), 60);
    assert!(sink.assets().contains(&h[0]));
}

#[test]
fn retrieval_failure_is_distinct_from_codec_failure() {
    let skel = biped();
    let (mut sched, cache) = scheduler(2, 1_000, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(1);

    sched.request_build(request(&skel, h[0], 0.0, 10), true, &mut sink);
    cache.fail_retrieval(true);
    cache.complete_all();
    sched.tick(&mut sink);

    assert!(matches!(
        sink.outcomes[0].result,
        Err(BuildError::CacheRetrievalFailed { .. })
    ));
    let d = sched.diagnostics();
    assert_eq!(d.retrieval_failures, 1);
    assert_eq!(d.failed, 0);
    assert_eq!(sched.budget().reserved(), 0);
}

#[test]
fn results_for_destroyed_assets_are_discarded() {
    let skel = biped();
    let (mut sched, cache) = scheduler(2, 1_000, QueuePolicy::Lifo);
    let mut sink = RecordingSink::default();
    let h = handles(1);

    sched.request_build(request(&skel, h[0], 0.0, 10), true, &mut sink);
    sink.destroyed.insert(h[0]);
    cache.complete_all();
    sched.tick(&mut sink);

    assert_eq!(sched.diagnostics().discarded, 1);
    assert_eq!(sched.budget().reserved(), 0);
}

#[test]
fn shutdown_releases_every_reservation() {
    let skel = biped();
    let (mut sched, cache) = scheduler(1, 100, QueuePolicy::Fifo);
    let mut sink = RecordingSink::default();
    let h = handles(3);

    for (i, handle) in h.iter().enumerate() {
        sched.request_build(request(&skel, *handle, i as f32, 30), true, &mut sink);
    }
    // queued jobs grabbed their budget at enqueue time
    assert_eq!(sched.budget().reserved(), 90);

    let budget = sched.budget().clone();
    sched.shutdown();
    assert_eq!(budget.reserved(), 0);
    assert_eq!(sched.queued_len(), 0);
    assert_eq!(sched.active_len(), 0);
    assert_eq!(cache.pending(), 0);
    assert!(sink.outcomes.is_empty());
}
