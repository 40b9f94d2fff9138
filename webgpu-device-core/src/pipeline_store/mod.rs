//! Internal pipeline store.
//!
//! A device-scoped collection of helper render/compute pipelines the device
//! synthesizes for itself — never exposed to the application — used to
//! implement operations WebGPU specifies in terms of an implicit draw or
//! dispatch (clearing a partially-covered depth/stencil attachment,
//! resolving a multisampled target, blitting a staging buffer into a
//! texture, copying a canvas-backed texture out for `copyExternalImageToTexture`,
//! and so on).
//!
//! Each submodule owns one helper family: what WGSL it generates, what its
//! content key must carry to stay content-addressed, and how many distinct
//! pipeline variants it can produce.

mod buffer_to_texture;
mod clear_with_draw;
mod copy_for_browser;
mod depth_blit;
mod resolve;
mod stencil_blit;
mod timestamp;

pub use buffer_to_texture::{BufferToTextureBlitKey, BufferToTextureBlitPipeline};
pub use clear_with_draw::{should_use_clear_with_draw_helper, ClearWithDrawKey, ClearWithDrawPipeline, LoadOp};
pub use copy_for_browser::{CopyForBrowserKey, CopyForBrowserPipeline, CopyForBrowserSteps};
pub use depth_blit::{DepthToDepthBlitKey, DepthToDepthBlitPipeline, Rg8ToDepth16UnormBlitPipeline};
pub use resolve::{ResolveWithDrawKey, ResolveWithDrawPipeline};
pub use stencil_blit::{R8ToStencilBlitPipeline, StencilBitTestPipeline};
pub use timestamp::TimestampQuantizationPipeline;

use once_cell::sync::OnceCell;

use crate::backend::{Backend, ShaderCompiler};
use crate::cache::ContentCache;
use crate::error::DeviceError;

/// Every helper pipeline family the device may need to synthesize, keyed by
/// content so two passes needing an identical helper share one pipeline
/// object, the same way application pipelines are content-addressed.
pub struct PipelineStore<B: Backend> {
    clear_with_draw: ContentCache<ClearWithDrawPipeline<B>>,
    buffer_to_texture: ContentCache<BufferToTextureBlitPipeline<B>>,
    resolve_with_draw: ContentCache<ResolveWithDrawPipeline<B>>,
    depth_to_depth: ContentCache<DepthToDepthBlitPipeline<B>>,
    copy_for_browser: ContentCache<CopyForBrowserPipeline<B>>,

    // The remaining helpers have no meaningful content variation (their
    // shader is fixed; only the device they belong to matters), so they are
    // device-scoped singletons rather than content-addressed caches.
    r8_to_stencil: OnceCell<R8ToStencilBlitPipeline<B>>,
    rg8_to_depth16unorm: OnceCell<Rg8ToDepth16UnormBlitPipeline<B>>,
    timestamp_quantization: OnceCell<TimestampQuantizationPipeline<B>>,
}

impl<B: Backend> Default for PipelineStore<B> {
    fn default() -> Self {
        Self {
            clear_with_draw: ContentCache::new(),
            buffer_to_texture: ContentCache::new(),
            resolve_with_draw: ContentCache::new(),
            depth_to_depth: ContentCache::new(),
            copy_for_browser: ContentCache::new(),
            r8_to_stencil: OnceCell::new(),
            rg8_to_depth16unorm: OnceCell::new(),
            timestamp_quantization: OnceCell::new(),
        }
    }
}

impl<B: Backend> PipelineStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_clear_with_draw<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
        key: ClearWithDrawKey,
    ) -> Result<crate::handle::Strong<ClearWithDrawPipeline<B>>, DeviceError> {
        self.clear_with_draw
            .get_or_create(&key, || ClearWithDrawPipeline::create(backend, compiler, key))
    }

    pub fn get_or_create_buffer_to_texture_blit<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
        key: BufferToTextureBlitKey,
    ) -> Result<crate::handle::Strong<BufferToTextureBlitPipeline<B>>, DeviceError> {
        self.buffer_to_texture
            .get_or_create(&key, || BufferToTextureBlitPipeline::create(backend, compiler, key))
    }

    pub fn get_or_create_resolve_with_draw<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
        key: ResolveWithDrawKey,
    ) -> Result<crate::handle::Strong<ResolveWithDrawPipeline<B>>, DeviceError> {
        self.resolve_with_draw
            .get_or_create(&key, || ResolveWithDrawPipeline::create(backend, compiler, key))
    }

    pub fn get_or_create_depth_to_depth_blit<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
        key: DepthToDepthBlitKey,
    ) -> Result<crate::handle::Strong<DepthToDepthBlitPipeline<B>>, DeviceError> {
        self.depth_to_depth
            .get_or_create(&key, || DepthToDepthBlitPipeline::create(backend, compiler, key))
    }

    pub fn get_or_create_copy_for_browser<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
        key: CopyForBrowserKey,
    ) -> Result<crate::handle::Strong<CopyForBrowserPipeline<B>>, DeviceError> {
        self.copy_for_browser
            .get_or_create(&key, || CopyForBrowserPipeline::create(backend, compiler, key))
    }

    pub fn r8_to_stencil<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
    ) -> Result<&R8ToStencilBlitPipeline<B>, DeviceError> {
        self.r8_to_stencil.get_or_try_init(|| R8ToStencilBlitPipeline::create(backend, compiler))
    }

    pub fn rg8_to_depth16unorm<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
    ) -> Result<&Rg8ToDepth16UnormBlitPipeline<B>, DeviceError> {
        self.rg8_to_depth16unorm
            .get_or_try_init(|| Rg8ToDepth16UnormBlitPipeline::create(backend, compiler))
    }

    pub fn timestamp_quantization<C: ShaderCompiler>(
        &self,
        backend: &B,
        compiler: &C,
    ) -> Result<&TimestampQuantizationPipeline<B>, DeviceError> {
        self.timestamp_quantization
            .get_or_try_init(|| TimestampQuantizationPipeline::create(backend, compiler))
    }

    /// Forgets every content-addressed helper pipeline whose last strong
    /// reference has already dropped. Singletons are unaffected — they live
    /// for the device's lifetime once built.
    pub fn compact(&self) {
        self.clear_with_draw.compact();
        self.buffer_to_texture.compact();
        self.resolve_with_draw.compact();
        self.depth_to_depth.compact();
        self.copy_for_browser.compact();
    }
}

/// Shared helper: hash a sequence of already-hashable fields into one u64,
/// the way every key type below builds its `content_hash`.
pub(crate) fn combine_hash(fields: &[u64]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for field in fields {
        field.hash(&mut hasher);
    }
    hasher.finish()
}
