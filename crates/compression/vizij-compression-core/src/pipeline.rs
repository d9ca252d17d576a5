//! Owning glue: assets, their models and the build scheduler.
//!
//! Edits go through [`CompressionPipeline::edit`]; a change set that requires a
//! rebuild marks the asset stale and requests an asynchronous build. Until the
//! result lands the asset plays its raw model data.

use std::sync::Arc;

use log::{debug, warn};
use vizij_anim_model::{Controller, DataModel, ModelError, ModelEvent, PoseSource};

use crate::additive::{AdditiveBase, AdditiveSettings, ResolvedBase};
use crate::asset::{AnimationAsset, AssetArena, AssetCompressionSettings, AssetHandle};
use crate::cache::{ContentAddressableCache, MemoryCache};
use crate::config::CompressionConfig;
use crate::diagnostics::SchedulerDiagnostics;
use crate::error::BuildError;
use crate::key::CacheKeyBuilder;
use crate::prepare::{prepare_compressible, PrepareOptions};
use crate::scheduler::{BuildRequest, BuildScheduler, BuildTicket, TickReport};

pub struct CompressionPipeline {
    config: CompressionConfig,
    assets: AssetArena<AnimationAsset>,
    scheduler: BuildScheduler,
    key_builder: CacheKeyBuilder,
}

impl CompressionPipeline {
    pub fn new(
        config: CompressionConfig,
        cache: Arc<dyn ContentAddressableCache>,
    ) -> Result<Self, BuildError> {
        let scheduler = BuildScheduler::new(&config, cache)?;
        Ok(Self {
            config,
            assets: AssetArena::new(),
            scheduler,
            key_builder: CacheKeyBuilder::default(),
        })
    }

    /// Pipeline backed by a [`MemoryCache`] with `config.worker_threads` workers.
    pub fn with_memory_cache(config: CompressionConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let cache = MemoryCache::new(config.worker_threads).map_err(|e| {
            BuildError::InvalidConfiguration {
                reason: e.to_string(),
            }
        })?;
        Self::new(config, Arc::new(cache))
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &BuildScheduler {
        &self.scheduler
    }

    pub fn diagnostics(&self) -> SchedulerDiagnostics {
        self.scheduler.diagnostics()
    }

    pub fn add_asset(
        &mut self,
        name: impl Into<String>,
        model: DataModel,
        settings: AssetCompressionSettings,
    ) -> AssetHandle {
        let handle = self.assets.insert(AnimationAsset::new(name, model, settings));
        debug!("{handle}: added");
        handle
    }

    /// Destroy an asset. A queued build is cancelled; an active one finishes and
    /// its result is discarded.
    pub fn remove_asset(&mut self, handle: AssetHandle) -> Option<AnimationAsset> {
        self.scheduler.cancel_if_not_started(handle);
        self.assets.remove(handle)
    }

    pub fn asset(&self, handle: AssetHandle) -> Option<&AnimationAsset> {
        self.assets.get(handle)
    }

    pub fn assets(&self) -> impl Iterator<Item = (AssetHandle, &AnimationAsset)> {
        self.assets.iter()
    }

    /// Replace an asset's settings and request an asynchronous rebuild.
    pub fn set_settings(
        &mut self,
        handle: AssetHandle,
        settings: AssetCompressionSettings,
    ) -> Result<BuildTicket, BuildError> {
        let asset = self.assets.get_mut(handle).ok_or(BuildError::AssetNotFound)?;
        asset.settings = settings;
        asset.stale = true;
        self.request_compression(handle, true)
    }

    /// Run controller edits on an asset's model. If they produce a change set that
    /// requires a rebuild, the asset goes stale and an asynchronous build is requested.
    pub fn edit<R>(
        &mut self,
        handle: AssetHandle,
        f: impl FnOnce(&mut Controller<'_>) -> Result<R, ModelError>,
    ) -> Result<R, BuildError> {
        let asset = self.assets.get_mut(handle).ok_or(BuildError::AssetNotFound)?;
        let result = {
            let mut ctrl = asset.model.controller();
            f(&mut ctrl)
        };
        let rebuild = asset.model.drain_events().iter().any(|e| {
            matches!(e, ModelEvent::ContentChanged(cs) if cs.requires_rebuild)
        });
        if rebuild {
            asset.stale = true;
            debug!("{handle} '{}': content changed, rebuilding", asset.name);
            if let Err(e) = self.request_compression(handle, true) {
                warn!("{handle}: rebuild request failed: {e}");
            }
        }
        result.map_err(BuildError::from)
    }

    /// Prepare the asset's data and hand it to the scheduler. Returns a completed
    /// ticket without building when the current compressed data already matches.
    pub fn request_compression(
        &mut self,
        handle: AssetHandle,
        is_async: bool,
    ) -> Result<BuildTicket, BuildError> {
        let asset = self.assets.get(handle).ok_or(BuildError::AssetNotFound)?;
        let base = asset
            .settings
            .additive
            .as_ref()
            .map(|additive| resolve_base(&self.assets, handle, additive));
        let prepared = prepare_compressible(
            &asset.model,
            &asset.settings,
            base,
            PrepareOptions::from(&self.config),
        );
        let codec = asset.settings.codec.clone();

        let data = match prepared {
            Ok(data) => data,
            Err(e) => {
                if let Some(asset) = self.assets.get_mut(handle) {
                    warn!("{handle} '{}': preparation failed: {e}", asset.name);
                    asset.stale = true;
                    asset.last_error = Some(e.clone());
                }
                return Err(e);
            }
        };
        let request = BuildRequest::new(handle, data, codec, &self.key_builder);

        let asset = self.assets.get_mut(handle).ok_or(BuildError::AssetNotFound)?;
        asset.requested_key = Some(request.key.clone());
        if let Some(current) = &asset.compressed {
            if current.key == request.key {
                debug!("{handle}: compressed data already matches {}", request.key);
                asset.stale = false;
                asset.last_error = None;
                let blob = current.blob.clone();
                self.scheduler.cancel_if_not_started(handle);
                return Ok(BuildTicket::Completed(Ok(blob)));
            }
        }
        Ok(self.scheduler.request_build(request, is_async, &mut self.assets))
    }

    pub fn tick(&mut self) -> TickReport {
        self.scheduler.tick(&mut self.assets)
    }

    /// Block until the asset's pending build is applied. `false` if none exists.
    pub fn wait(&mut self, handle: AssetHandle) -> bool {
        self.scheduler.wait(handle, &mut self.assets)
    }

    pub fn cancel(&mut self, handle: AssetHandle) -> bool {
        self.scheduler.cancel_if_not_started(handle)
    }
}

fn resolve_base<'a>(
    assets: &'a AssetArena<AnimationAsset>,
    target: AssetHandle,
    settings: &AdditiveSettings,
) -> Result<ResolvedBase<'a>, BuildError> {
    let source = |handle: AssetHandle| -> Result<&'a dyn PoseSource, BuildError> {
        if handle == target {
            return Err(BuildError::MissingAdditiveBase {
                reason: format!("{handle} is its own base"),
            });
        }
        assets
            .get(handle)
            .map(|a| &a.model as &dyn PoseSource)
            .ok_or_else(|| BuildError::MissingAdditiveBase {
                reason: format!("base {handle} no longer exists"),
            })
    };
    Ok(match settings.base {
        AdditiveBase::RefPose => ResolvedBase::RefPose,
        AdditiveBase::ScaledAnimation(h) => ResolvedBase::Scaled(source(h)?),
        AdditiveBase::AnimationFrame { asset, frame } => ResolvedBase::Frame {
            source: source(asset)?,
            frame,
        },
    })
}
