//! Depth blit helpers: RG8-to-depth16unorm (the depth half of the
//! buffer-to-depth-stencil staging path) and depth-to-depth.

use std::marker::PhantomData;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::handle::ContentHash;

use super::combine_hash;

/// Singleton: a staging buffer always decodes the same way into a
/// depth16unorm target regardless of which texture it eventually targets.
pub struct Rg8ToDepth16UnormBlitPipeline<B: Backend> {
    pub pipeline: B::RenderPipeline,
}

impl<B: Backend> Rg8ToDepth16UnormBlitPipeline<B> {
    pub fn create<C: ShaderCompiler>(backend: &B, compiler: &C) -> Result<Self, DeviceError> {
        let source = "\
            @group(0) @binding(0) var src: texture_2d<u32>;\n\
            @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
            \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
            \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}\n\
            @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) -> @builtin(frag_depth) f32 {\n\
            \u{20}   let texel = textureLoad(src, vec2<i32>(pos.xy), 0).rg;\n\
            \u{20}   let combined = texel.r | (texel.g << 8u);\n\
            \u{20}   return f32(combined) / 65535.0;\n}\n";
        let (module, info) = compiler.compile_wgsl(source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("rg8-to-depth16unorm shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self { pipeline })
    }
}

/// Depth-to-depth blits, unlike the RG8 decode, do vary by source/destination
/// format pair (a `Depth32Float` source read into a `Depth16Unorm`
/// destination needs a different fragment stage than a same-format copy), so
/// this one stays content-addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthToDepthBlitKey {
    pub src_format: TextureFormat,
    pub dst_format: TextureFormat,
}

impl ContentHash for DepthToDepthBlitKey {
    fn content_hash(&self) -> u64 {
        combine_hash(&[self.src_format as u64, self.dst_format as u64])
    }

    fn content_equal(&self, other: &Self) -> bool {
        self == other
    }
}

pub struct DepthToDepthBlitPipeline<B: Backend> {
    pub key: DepthToDepthBlitKey,
    pub pipeline: B::RenderPipeline,
    _marker: PhantomData<B>,
}

impl<B: Backend> ContentHash for DepthToDepthBlitPipeline<B> {
    fn content_hash(&self) -> u64 {
        self.key.content_hash()
    }

    fn content_equal(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<B: Backend> DepthToDepthBlitPipeline<B> {
    pub fn create<C: ShaderCompiler>(
        backend: &B,
        compiler: &C,
        key: DepthToDepthBlitKey,
    ) -> Result<Self, DeviceError> {
        let source = "\
            @group(0) @binding(0) var src: texture_depth_2d;\n\
            @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
            \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
            \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}\n\
            @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) -> @builtin(frag_depth) f32 {\n\
            \u{20}   return textureLoad(src, vec2<i32>(pos.xy), 0);\n}\n";
        let (module, info) = compiler.compile_wgsl(source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("depth-to-depth blit shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self { key, pipeline, _marker: PhantomData })
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_format_pair_hashes_equal() {
        let a = DepthToDepthBlitKey { src_format: TextureFormat::Depth32Float, dst_format: TextureFormat::Depth16Unorm };
        let b = DepthToDepthBlitKey { src_format: TextureFormat::Depth32Float, dst_format: TextureFormat::Depth16Unorm };
        assert_eq!(a.content_hash(), b.content_hash());
        assert!(a.content_equal(&b));
    }

    #[test]
    fn swapped_format_pair_is_distinct() {
        let a = DepthToDepthBlitKey { src_format: TextureFormat::Depth32Float, dst_format: TextureFormat::Depth16Unorm };
        let b = DepthToDepthBlitKey { src_format: TextureFormat::Depth16Unorm, dst_format: TextureFormat::Depth32Float };
        assert!(!a.content_equal(&b));
    }
}
