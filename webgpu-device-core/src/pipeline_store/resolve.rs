//! Resolve-with-draw and expand-resolve-with-draw helpers: when a render
//! pass both loads an existing resolve target's contents (`loadOp: "load"`)
//! and writes a new multisampled draw into it, backends without native
//! load+resolve must first expand the single-sampled resolve target back
//! into a multisampled scratch texture, draw, then resolve again.

use std::marker::PhantomData;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::handle::ContentHash;

use super::combine_hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResolveWithDrawKey {
    pub format: TextureFormat,
    pub sample_count: u32,
    /// Whether the resolve target's prior contents must be expanded into the
    /// multisampled scratch texture before the pass runs. `false` for a
    /// plain `loadOp: "clear"` resolve target, since there is nothing to
    /// preserve.
    pub expand_existing_contents: bool,
}

impl ContentHash for ResolveWithDrawKey {
    fn content_hash(&self) -> u64 {
        combine_hash(&[self.format as u64, self.sample_count as u64, self.expand_existing_contents as u64])
    }

    fn content_equal(&self, other: &Self) -> bool {
        self == other
    }
}

pub struct ResolveWithDrawPipeline<B: Backend> {
    pub key: ResolveWithDrawKey,
    pub resolve_pipeline: B::RenderPipeline,
    /// Present only when `key.expand_existing_contents` is set.
    pub expand_pipeline: Option<B::RenderPipeline>,
    _marker: PhantomData<B>,
}

impl<B: Backend> ContentHash for ResolveWithDrawPipeline<B> {
    fn content_hash(&self) -> u64 {
        self.key.content_hash()
    }

    fn content_equal(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<B: Backend> ResolveWithDrawPipeline<B> {
    pub fn create<C: ShaderCompiler>(
        backend: &B,
        compiler: &C,
        key: ResolveWithDrawKey,
    ) -> Result<Self, DeviceError> {
        let resolve_source = format!(
            "@group(0) @binding(0) var src: texture_multisampled_2d<f32>;\n\
             @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {{\n\
             \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
             \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}}\n\
             @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {{\n\
             \u{20}   var sum = vec4<f32>(0.0);\n    for (var s = 0u; s < {sample_count}u; s = s + 1u) {{\n\
             \u{20}       sum = sum + textureLoad(src, vec2<i32>(pos.xy), i32(s));\n    }}\n\
             \u{20}   return sum / f32({sample_count}u);\n}}\n",
            sample_count = key.sample_count,
        );
        let (module, info) = compiler.compile_wgsl(&resolve_source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("resolve-with-draw shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let resolve_pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;

        let expand_pipeline = if key.expand_existing_contents {
            let expand_source = "\
                @group(0) @binding(0) var src: texture_2d<f32>;\n\
                @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
                \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
                \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}\n\
                @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {\n\
                \u{20}   return textureLoad(src, vec2<i32>(pos.xy), 0);\n}\n";
            let (module, info) = compiler.compile_wgsl(expand_source, &[])?;
            if info.has_errors() {
                return Err(DeviceError::Internal("expand-resolve-with-draw shader failed to compile".into()));
            }
            let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
            let layout = backend.create_pipeline_layout_impl()?;
            Some(backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?)
        } else {
            None
        };

        Ok(Self { key, resolve_pipeline, expand_pipeline, _marker: PhantomData })
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_flag_participates_in_content_hash() {
        let base = ResolveWithDrawKey { format: TextureFormat::Rgba8Unorm, sample_count: 4, expand_existing_contents: false };
        let expanding = ResolveWithDrawKey { expand_existing_contents: true, ..base };
        assert_ne!(base.content_hash(), expanding.content_hash());
    }
}
