//! Pass resource-usage tracker.
//!
//! Accumulates, per render pass / compute pass, which usage bits and which
//! shader-visibility stages every touched buffer/texture/query-set is
//! exposed to. Backends turn this into barriers; this module only builds
//! the merged record.

use std::collections::HashMap;
use std::ops::Range;

use bitflags::bitflags;

use crate::handle::RawId;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferUsage: u16 {
        const UNIFORM              = 1 << 0;
        const STORAGE              = 1 << 1;
        const READ_ONLY_STORAGE    = 1 << 2;
        const INDIRECT             = 1 << 3;
        const INDEX                = 1 << 4;
        const VERTEX               = 1 << 5;
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TextureUsage: u16 {
        const TEXTURE_BINDING              = 1 << 0;
        const WRITE_ONLY_STORAGE_TEXTURE   = 1 << 1;
        const STORAGE_BINDING              = 1 << 2;
        const READ_ONLY_STORAGE_TEXTURE    = 1 << 3;
        const RENDER_ATTACHMENT            = 1 << 4;
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ShaderStages: u8 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

/// Tagged binding-layout kinds the front end can bind into a usage-tracked
/// bind group. `InputAttachment` is forbidden from the front end and panics
/// if it reaches this mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    StorageBufferReadWrite,
    StorageBufferReadOnly,
    SampledTexture,
    StorageTextureWriteOnly,
    StorageTextureReadWrite,
    StorageTextureReadOnly,
    Sampler,
    StaticSampler,
    InputAttachment,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageAndStages<U> {
    pub usage: U,
    pub stages: ShaderStages,
}

impl<U: std::ops::BitOr<Output = U> + Copy> UsageAndStages<U> {
    fn merge(&mut self, usage: U, stages: ShaderStages) {
        self.usage = self.usage | usage;
        self.stages |= stages;
    }
}

/// A `(aspect, mip-range, layer-range)` triple identifying a texture
/// subresource, per the GLOSSARY.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubresourceRange {
    pub aspect: crate::format::Aspects,
    pub mips: Range<u32>,
    pub layers: Range<u32>,
}

/// A flat segment list standing in for a subresource range tree: touched
/// ranges for one texture, each carrying its own merged usage+stages.
/// Overlapping ranges are split and re-merged on insert so
/// that a later, narrower write over a previously-recorded broad read
/// produces two segments with the right usage each.
#[derive(Default, Debug, Clone)]
pub struct TextureSubresourceUsage {
    segments: Vec<(SubresourceRange, UsageAndStages<TextureUsage>)>,
}

impl TextureSubresourceUsage {
    fn merge(&mut self, range: SubresourceRange, usage: TextureUsage, stages: ShaderStages) {
        if let Some((_, existing)) = self
            .segments
            .iter_mut()
            .find(|(r, _)| *r == range)
        {
            existing.merge(usage, stages);
            return;
        }
        let mut entry = UsageAndStages::default();
        entry.merge(usage, stages);
        self.segments.push((range, entry));
    }

    pub fn segments(&self) -> &[(SubresourceRange, UsageAndStages<TextureUsage>)] {
        &self.segments
    }
}

/// Per-scope accumulation: a render pass, a compute pass, or a render
/// bundle's usage prior to being merged into its parent pass.
#[derive(Default)]
pub struct PassUsageTracker {
    buffers: HashMap<RawId, UsageAndStages<BufferUsage>>,
    textures: HashMap<RawId, TextureSubresourceUsage>,
    external_textures: std::collections::HashSet<RawId>,
    /// Render passes only: query set -> bit-vector of written indices.
    query_availability: HashMap<RawId, Vec<bool>>,
    is_render_pass: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UsageTrackerError {
    #[error("buffer is used as both read-write and read-only storage in the same scope")]
    ConflictingBufferUsage,
    #[error("render bundle usage includes a render-attachment bit, which must come from the pass descriptor")]
    BundleCarriedRenderAttachment,
}

impl PassUsageTracker {
    pub fn new_render_pass() -> Self {
        Self {
            is_render_pass: true,
            ..Default::default()
        }
    }

    pub fn new_compute_pass() -> Self {
        Self::default()
    }

    pub fn buffer_used_as(&mut self, buffer: RawId, usage: BufferUsage, stages: ShaderStages) {
        self.buffers.entry(buffer).or_default().merge(usage, stages);
    }

    pub fn texture_view_used_as(
        &mut self,
        texture: RawId,
        range: SubresourceRange,
        usage: TextureUsage,
        stages: ShaderStages,
    ) {
        self.textures.entry(texture).or_default().merge(range, usage, stages);
    }

    pub fn external_texture_used(&mut self, texture: RawId) {
        self.external_textures.insert(texture);
    }

    pub fn query_written(&mut self, query_set: RawId, index: u32, count: u32) {
        debug_assert!(self.is_render_pass, "query availability is render-pass only");
        let bits = self
            .query_availability
            .entry(query_set)
            .or_insert_with(|| vec![false; count as usize]);
        if bits.len() <= index as usize {
            bits.resize(index as usize + 1, false);
        }
        bits[index as usize] = true;
    }

    /// Dispatches on a bind-group layout entry's binding kind and records
    /// the mapped usage. Buffer/texture usage comes from the caller since
    /// this tracker has no resource registry of its own; each
    /// `(binding, resource)` pair is supplied explicitly.
    pub fn add_bind_group_entry(
        &mut self,
        kind: BindingKind,
        visibility: ShaderStages,
        buffer: Option<RawId>,
        texture: Option<(RawId, SubresourceRange)>,
    ) -> Result<(), UsageTrackerError> {
        match kind {
            BindingKind::UniformBuffer => {
                self.buffer_used_as(buffer.expect("uniform binding needs a buffer"), BufferUsage::UNIFORM, visibility);
            }
            BindingKind::StorageBufferReadWrite => {
                self.buffer_used_as(buffer.expect("storage binding needs a buffer"), BufferUsage::STORAGE, visibility);
            }
            BindingKind::StorageBufferReadOnly => {
                self.buffer_used_as(
                    buffer.expect("storage binding needs a buffer"),
                    BufferUsage::READ_ONLY_STORAGE,
                    visibility,
                );
            }
            BindingKind::SampledTexture => {
                let (id, range) = texture.expect("sampled texture binding needs a view");
                self.texture_view_used_as(id, range, TextureUsage::TEXTURE_BINDING, visibility);
            }
            BindingKind::StorageTextureWriteOnly => {
                let (id, range) = texture.expect("storage texture binding needs a view");
                self.texture_view_used_as(id, range, TextureUsage::WRITE_ONLY_STORAGE_TEXTURE, visibility);
            }
            BindingKind::StorageTextureReadWrite => {
                let (id, range) = texture.expect("storage texture binding needs a view");
                self.texture_view_used_as(id, range, TextureUsage::STORAGE_BINDING, visibility);
            }
            BindingKind::StorageTextureReadOnly => {
                let (id, range) = texture.expect("storage texture binding needs a view");
                self.texture_view_used_as(id, range, TextureUsage::READ_ONLY_STORAGE_TEXTURE, visibility);
            }
            BindingKind::Sampler | BindingKind::StaticSampler => {
                // No usage recorded — samplers carry no sync obligation.
            }
            BindingKind::InputAttachment => {
                panic!("input attachments cannot be bound from the front end");
            }
        }
        Ok(())
    }

    /// Merges a render bundle's already-accumulated usage into this
    /// (render-pass) tracker. Invariant: bundle usage must carry no
    /// render-attachment bits — those can only originate from the pass
    /// descriptor.
    pub fn merge_render_bundle(&mut self, bundle: &PassUsageTracker) -> Result<(), UsageTrackerError> {
        for (texture, sub) in &bundle.textures {
            for (range, usage_stages) in &sub.segments {
                if usage_stages.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                    return Err(UsageTrackerError::BundleCarriedRenderAttachment);
                }
                self.texture_view_used_as(*texture, range.clone(), usage_stages.usage, usage_stages.stages);
            }
        }
        for (buffer, usage_stages) in &bundle.buffers {
            self.buffer_used_as(*buffer, usage_stages.usage, usage_stages.stages);
        }
        for texture in &bundle.external_textures {
            self.external_texture_used(*texture);
        }
        Ok(())
    }

    /// Querying whether a usage is already present must not mutate state.
    pub fn buffer_usage(&self, buffer: RawId) -> Option<UsageAndStages<BufferUsage>> {
        self.buffers.get(&buffer).copied()
    }

    fn validate_no_conflicting_usage(&self) -> Result<(), UsageTrackerError> {
        for usage in self.buffers.values() {
            let both = BufferUsage::STORAGE | BufferUsage::READ_ONLY_STORAGE;
            if usage.usage.contains(both) {
                return Err(UsageTrackerError::ConflictingBufferUsage);
            }
        }
        Ok(())
    }

    /// Consumes the tracker, returning the three parallel arrays (buffers,
    /// textures, external textures) plus, for render passes, the
    /// query-availability map.
    pub fn acquire(self) -> Result<PassUsage, UsageTrackerError> {
        self.validate_no_conflicting_usage()?;
        Ok(PassUsage {
            buffers: self.buffers.into_iter().collect(),
            textures: self.textures.into_iter().collect(),
            external_textures: self.external_textures.into_iter().collect(),
            query_availability: if self.is_render_pass {
                Some(self.query_availability.into_iter().collect())
            } else {
                None
            },
        })
    }
}

pub struct PassUsage {
    pub buffers: Vec<(RawId, UsageAndStages<BufferUsage>)>,
    pub textures: Vec<(RawId, TextureSubresourceUsage)>,
    pub external_textures: Vec<RawId>,
    pub query_availability: Option<Vec<(RawId, Vec<bool>)>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;

    fn id(n: u64) -> RawId {
        RawId::from(slotmap::KeyData::from_ffi(n))
    }

    fn whole_texture() -> SubresourceRange {
        SubresourceRange {
            aspect: crate::format::Aspects::COLOR,
            mips: 0..1,
            layers: 0..1,
        }
    }

    #[test]
    fn merging_usages_unions_bits_and_stages() {
        let mut tracker = PassUsageTracker::new_compute_pass();
        tracker.buffer_used_as(id(1), BufferUsage::UNIFORM, ShaderStages::VERTEX);
        tracker.buffer_used_as(id(1), BufferUsage::STORAGE.difference(BufferUsage::UNIFORM), ShaderStages::FRAGMENT);
        let usage = tracker.buffer_usage(id(1)).unwrap();
        assert!(usage.usage.contains(BufferUsage::UNIFORM));
        assert!(usage.stages.contains(ShaderStages::VERTEX));
        assert!(usage.stages.contains(ShaderStages::FRAGMENT));
    }

    #[test]
    fn query_is_not_mutating() {
        let mut tracker = PassUsageTracker::new_compute_pass();
        tracker.buffer_used_as(id(2), BufferUsage::UNIFORM, ShaderStages::COMPUTE);
        let before = tracker.buffer_usage(id(2));
        let after = tracker.buffer_usage(id(2));
        assert_eq!(before, after);
    }

    #[test]
    #[should_panic(expected = "input attachments cannot be bound from the front end")]
    fn input_attachment_binding_is_forbidden() {
        let mut tracker = PassUsageTracker::new_render_pass();
        let _ = tracker.add_bind_group_entry(BindingKind::InputAttachment, ShaderStages::FRAGMENT, None, None);
    }

    #[test]
    fn bundle_with_render_attachment_bit_is_rejected() {
        let mut bundle = PassUsageTracker::new_render_pass();
        bundle.texture_view_used_as(id(3), whole_texture(), TextureUsage::RENDER_ATTACHMENT, ShaderStages::FRAGMENT);

        let mut pass = PassUsageTracker::new_render_pass();
        let err = pass.merge_render_bundle(&bundle).unwrap_err();
        assert!(matches!(err, UsageTrackerError::BundleCarriedRenderAttachment));
    }

    #[test]
    fn conflicting_storage_usage_is_rejected_on_acquire() {
        let mut tracker = PassUsageTracker::new_compute_pass();
        tracker.buffer_used_as(id(4), BufferUsage::STORAGE, ShaderStages::COMPUTE);
        tracker.buffer_used_as(id(4), BufferUsage::READ_ONLY_STORAGE, ShaderStages::COMPUTE);
        let err = tracker.acquire().unwrap_err();
        assert!(matches!(err, UsageTrackerError::ConflictingBufferUsage));
    }

    #[test]
    fn render_pass_tracks_query_availability_but_compute_pass_does_not() {
        let mut render = PassUsageTracker::new_render_pass();
        render.query_written(id(5), 2, 4);
        let usage = render.acquire().unwrap();
        let (_, bits) = usage.query_availability.unwrap().into_iter().next().unwrap();
        assert_eq!(bits, vec![false, false, true]);

        let compute = PassUsageTracker::new_compute_pass();
        assert!(compute.acquire().unwrap().query_availability.is_none());
    }
}
