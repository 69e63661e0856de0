//! Hash-keyed deduplication of GPU objects.
//!
//! Five maps, one lock each: render passes, framebuffers, pipeline layouts,
//! graphics pipelines, and descriptor-set layouts (deduped inside the
//! pipeline-layout path). Lookups take the shared lock; on a miss the
//! object is built through the device outside any lock and inserted under
//! the exclusive lock. A second builder losing that race keeps the winner's
//! entry and destroys its own build, never the entry already in the map.

use crate::descriptor::DescriptorSetLayoutSpec;
use crate::device::RenderDevice;
use crate::error::{DeviceError, DeviceResult};
use crate::handle::{FramebufferHandle, PipelineHandle, RenderPassHandle, ShaderHandle};
use crate::pipeline::GraphicsPipelineSpec;
use crate::renderpass::{FramebufferSpec, RenderPassSpec};
use crate::shader::PushConstantRange;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The portable shape of a pipeline layout: one descriptor-set layout per
/// set index plus the push constant range, deduped by the shader group
/// hash. The same shader group always maps to exactly one of these.
#[derive(Clone, Debug)]
pub struct PipelineLayoutInfo {
    pub group_hash: u64,
    pub set_layouts: Vec<Arc<DescriptorSetLayoutSpec>>,
    pub push_constants: Option<PushConstantRange>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Process-wide cache of GPU objects keyed by their create descriptors.
#[derive(Default)]
pub struct ResourceCache {
    render_passes: RwLock<FxHashMap<RenderPassSpec, RenderPassHandle>>,
    framebuffers: RwLock<FxHashMap<FramebufferSpec, FramebufferHandle>>,
    pipeline_layouts: RwLock<FxHashMap<u64, PipelineLayoutInfo>>,
    graphics_pipelines: RwLock<FxHashMap<GraphicsPipelineSpec, PipelineHandle>>,
    set_layouts: RwLock<FxHashMap<DescriptorSetLayoutSpec, Arc<DescriptorSetLayoutSpec>>>,
    render_pass_stats: Counters,
    framebuffer_stats: Counters,
    pipeline_layout_stats: Counters,
    graphics_pipeline_stats: Counters,
}

fn request<K, V, B, D>(
    map: &RwLock<FxHashMap<K, V>>,
    counters: &Counters,
    key: &K,
    build: B,
    discard: D,
) -> DeviceResult<V>
where
    K: Eq + Hash + Clone,
    V: Copy,
    B: FnOnce() -> DeviceResult<V>,
    D: FnOnce(V),
{
    if let Some(&value) = map.read().get(key) {
        counters.hit();
        return Ok(value);
    }
    counters.miss();
    // build outside the lock; contended misses may build twice, the loser
    // discards its copy below
    let built = build()?;
    match map.write().entry(key.clone()) {
        Entry::Occupied(entry) => {
            let winner = *entry.get();
            discard(built);
            Ok(winner)
        }
        Entry::Vacant(entry) => {
            entry.insert(built);
            Ok(built)
        }
    }
}

impl ResourceCache {
    pub fn new() -> ResourceCache {
        ResourceCache::default()
    }

    pub fn request_render_pass(
        &self,
        device: &dyn RenderDevice,
        spec: &RenderPassSpec,
    ) -> DeviceResult<RenderPassHandle> {
        request(
            &self.render_passes,
            &self.render_pass_stats,
            spec,
            || {
                log::debug!(
                    "building render pass ({} attachments, {} subpasses)",
                    spec.attachments.len(),
                    spec.subpasses.len()
                );
                device.create_render_pass(spec)
            },
            |h| device.destroy_render_pass(h),
        )
    }

    pub fn request_framebuffer(
        &self,
        device: &dyn RenderDevice,
        spec: &FramebufferSpec,
    ) -> DeviceResult<FramebufferHandle> {
        request(
            &self.framebuffers,
            &self.framebuffer_stats,
            spec,
            || {
                log::debug!(
                    "building framebuffer {}x{} ({} attachments)",
                    spec.extent.width,
                    spec.extent.height,
                    spec.attachments.len()
                );
                device.create_framebuffer(spec)
            },
            |h| device.destroy_framebuffer(h),
        )
    }

    /// Builds (or returns) the pipeline layout of a shader group, routing
    /// every contained set layout through the set-layout dedup map.
    pub fn request_pipeline_layout(
        &self,
        device: &dyn RenderDevice,
        shader: ShaderHandle,
    ) -> DeviceResult<PipelineLayoutInfo> {
        let info = device
            .shader_group_info(shader)
            .ok_or(DeviceError::HandleInvalid(shader.raw()))?;

        if let Some(layout) = self.pipeline_layouts.read().get(&info.group_hash) {
            self.pipeline_layout_stats.hit();
            return Ok(layout.clone());
        }
        self.pipeline_layout_stats.miss();

        let set_layouts = info
            .descriptor_sets
            .iter()
            .enumerate()
            .map(|(set_index, resources)| {
                let spec =
                    DescriptorSetLayoutSpec::from_shader_resources(set_index as u32, resources);
                self.dedup_set_layout(spec)
            })
            .collect();
        let layout = PipelineLayoutInfo {
            group_hash: info.group_hash,
            set_layouts,
            push_constants: info.push_constants.clone(),
        };

        Ok(self
            .pipeline_layouts
            .write()
            .entry(info.group_hash)
            .or_insert(layout)
            .clone())
    }

    fn dedup_set_layout(&self, spec: DescriptorSetLayoutSpec) -> Arc<DescriptorSetLayoutSpec> {
        if let Some(existing) = self.set_layouts.read().get(&spec) {
            return existing.clone();
        }
        self.set_layouts
            .write()
            .entry(spec.clone())
            .or_insert_with(|| Arc::new(spec))
            .clone()
    }

    pub fn request_graphics_pipeline(
        &self,
        device: &dyn RenderDevice,
        spec: &GraphicsPipelineSpec,
    ) -> DeviceResult<PipelineHandle> {
        request(
            &self.graphics_pipelines,
            &self.graphics_pipeline_stats,
            spec,
            || {
                log::debug!("building graphics pipeline for shader {:?}", spec.shader);
                device.create_pipeline(&crate::pipeline::PipelineSpec::Graphics(spec.clone()))
            },
            |h| device.destroy_pipeline(h),
        )
    }

    pub fn render_pass_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.render_pass_stats.hits.load(Ordering::Relaxed),
            misses: self.render_pass_stats.misses.load(Ordering::Relaxed),
        }
    }

    pub fn graphics_pipeline_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.graphics_pipeline_stats.hits.load(Ordering::Relaxed),
            misses: self.graphics_pipeline_stats.misses.load(Ordering::Relaxed),
        }
    }

    pub fn framebuffer_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.framebuffer_stats.hits.load(Ordering::Relaxed),
            misses: self.framebuffer_stats.misses.load(Ordering::Relaxed),
        }
    }

    pub fn pipeline_layout_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.pipeline_layout_stats.hits.load(Ordering::Relaxed),
            misses: self.pipeline_layout_stats.misses.load(Ordering::Relaxed),
        }
    }

    /// Destroys every cached object. The caller must have waited for the
    /// device to go idle first.
    pub fn clear(&self, device: &dyn RenderDevice) {
        for (_, handle) in self.graphics_pipelines.write().drain() {
            device.destroy_pipeline(handle);
        }
        for (_, handle) in self.framebuffers.write().drain() {
            device.destroy_framebuffer(handle);
        }
        for (_, handle) in self.render_passes.write().drain() {
            device.destroy_render_pass(handle);
        }
        self.pipeline_layouts.write().clear();
        self.set_layouts.write().clear();
    }
}
