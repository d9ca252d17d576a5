#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use vizij_anim_model::{
    parse_sequence_json, parse_skeleton_json, BoneIndex, BoneTrack, DataModel, FrameRate,
    Interpolation, Skeleton, TrackKeys, Transform,
};
use vizij_compression::{
    AssetHandle, Blob, BuildFn, BuildOutcome, BuildRequest, BuildSink, CacheError, CacheJobHandle,
    CacheKey, CacheKeyBuilder, CompressibleData, CompressibleParts, ContentAddressableCache,
    RawCodec,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn biped() -> Arc<Skeleton> {
    let json = vizij_test_fixtures::skeletons::json("biped").expect("biped fixture");
    Arc::new(parse_skeleton_json(&json).expect("parse biped"))
}

pub fn load_model(sequence: &str, skeleton: &Arc<Skeleton>) -> DataModel {
    let json = vizij_test_fixtures::sequences::json(sequence).expect("sequence fixture");
    let desc = parse_sequence_json(&json).expect("parse sequence");
    DataModel::from_sequence(skeleton.clone(), &desc).expect("build model")
}

/// Parts of a small prepared snapshot whose content depends on `seed`.
pub fn sample_parts(skeleton: &Arc<Skeleton>, seed: f32) -> CompressibleParts {
    let frames: Vec<Transform> = (0..5)
        .map(|i| Transform::from_translation(Vec3::new(seed, i as f32, 0.0)))
        .collect();
    CompressibleParts {
        name: format!("sample-{seed}"),
        skeleton: skeleton.clone(),
        tracks: vec![BoneTrack::new(
            "pelvis",
            BoneIndex(1),
            TrackKeys::from_transforms(&frames),
        )],
        curves: Vec::new(),
        interpolation: Interpolation::Linear,
        frame_rate: FrameRate::FPS_30,
        num_keys: 5,
        play_length: 4.0 / 30.0,
        error_threshold_scale: 1.0,
        is_additive: false,
        frames_stripped: false,
    }
}

pub fn sample_data(skeleton: &Arc<Skeleton>, seed: f32) -> CompressibleData {
    CompressibleData::new(sample_parts(skeleton, seed))
}

/// Request for `asset` with a fixed size estimate.
pub fn request(
    skeleton: &Arc<Skeleton>,
    asset: AssetHandle,
    seed: f32,
    estimate_bytes: u64,
) -> BuildRequest {
    let mut req = BuildRequest::new(
        asset,
        sample_data(skeleton, seed),
        Arc::new(RawCodec),
        &CacheKeyBuilder::default(),
    );
    req.estimate_bytes = estimate_bytes;
    req
}

/// Sink that records outcomes; handles listed in `destroyed` report as gone.
#[derive(Default)]
pub struct RecordingSink {
    pub outcomes: Vec<BuildOutcome>,
    pub destroyed: HashSet<AssetHandle>,
}

impl RecordingSink {
    pub fn assets(&self) -> Vec<AssetHandle> {
        self.outcomes.iter().map(|o| o.asset).collect()
    }
}

impl BuildSink for RecordingSink {
    fn apply(&mut self, outcome: BuildOutcome) -> bool {
        let live = !self.destroyed.contains(&outcome.asset);
        self.outcomes.push(outcome);
        live
    }
}

#[derive(Default)]
struct ManualState {
    entries: HashMap<CacheKey, Blob>,
    next_job: u64,
    pending: HashMap<u64, (CacheKey, BuildFn)>,
    finished: HashMap<u64, Result<Blob, CacheError>>,
    started: Vec<CacheKey>,
    fail_retrieval: bool,
    refuse_async: bool,
}

impl ManualState {
    fn run(&mut self, job: u64) {
        let Some((key, build)) = self.pending.remove(&job) else {
            return;
        };
        let result = if self.fail_retrieval {
            Err(CacheError::Retrieval {
                reason: "storage offline".into(),
            })
        } else {
            match build() {
                Ok(blob) => {
                    let blob: Blob = Arc::new(blob.into_bytes());
                    self.entries.insert(key, blob.clone());
                    Ok(blob)
                }
                Err(e) => Err(CacheError::BuildFailed(e)),
            }
        };
        self.finished.insert(job, result);
    }
}

/// Cache whose asynchronous jobs only finish when the test says so.
#[derive(Default)]
pub struct ManualCache {
    state: Mutex<ManualState>,
    poll_delay: Mutex<Duration>,
}

impl ManualCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish every pending asynchronous job.
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        let jobs: Vec<u64> = state.pending.keys().copied().collect();
        for job in jobs {
            state.run(job);
        }
    }

    /// Finish the pending job building `key`.
    pub fn complete(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        let job = state
            .pending
            .iter()
            .find(|(_, (k, _))| k == key)
            .map(|(id, _)| *id);
        if let Some(job) = job {
            state.run(job);
        }
    }

    /// Make every build finished from now on fail with a retrieval error.
    pub fn fail_retrieval(&self, fail: bool) {
        self.state.lock().fail_retrieval = fail;
    }

    /// Make `build_async` refuse new jobs.
    pub fn refuse_async(&self, refuse: bool) {
        self.state.lock().refuse_async = refuse;
    }

    /// Make every `poll` take at least `delay`.
    pub fn set_poll_delay(&self, delay: Duration) {
        *self.poll_delay.lock() = delay;
    }

    pub fn started(&self) -> Vec<CacheKey> {
        self.state.lock().started.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }
}

impl ContentAddressableCache for ManualCache {
    fn get_sync(&self, key: &CacheKey) -> Result<Option<Blob>, CacheError> {
        Ok(self.state.lock().entries.get(key).cloned())
    }

    fn build_sync(&self, key: &CacheKey, build: BuildFn) -> Result<Blob, CacheError> {
        let blob: Blob = Arc::new(build().map_err(CacheError::BuildFailed)?.into_bytes());
        self.state.lock().entries.insert(key.clone(), blob.clone());
        Ok(blob)
    }

    fn build_async(&self, key: &CacheKey, build: BuildFn) -> Result<CacheJobHandle, CacheError> {
        let mut state = self.state.lock();
        if state.refuse_async {
            return Err(CacheError::Retrieval {
                reason: "job queue closed".into(),
            });
        }
        let id = state.next_job;
        state.next_job += 1;
        state.started.push(key.clone());
        state.pending.insert(id, (key.clone(), build));
        Ok(CacheJobHandle(id))
    }

    fn poll(&self, job: CacheJobHandle) -> Option<Result<Blob, CacheError>> {
        let delay = *self.poll_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        if let Some(result) = state.finished.remove(&job.0) {
            return Some(result);
        }
        if state.pending.contains_key(&job.0) {
            return None;
        }
        Some(Err(CacheError::Retrieval {
            reason: format!("unknown job {}", job.0),
        }))
    }

    fn wait(&self, job: CacheJobHandle) -> Result<Blob, CacheError> {
        let mut state = self.state.lock();
        state.run(job.0);
        state.finished.remove(&job.0).unwrap_or_else(|| {
            Err(CacheError::Retrieval {
                reason: format!("unknown job {}", job.0),
            })
        })
    }
}
