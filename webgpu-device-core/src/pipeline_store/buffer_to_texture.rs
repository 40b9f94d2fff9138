//! Buffer-to-texture blit helper: writes a staging buffer's bytes into a
//! texture via a full-screen draw for the formats in
//! [`crate::format::BUFFER_TO_TEXTURE_BLIT_FORMATS`], used where a backend's
//! native buffer-to-texture copy can't handle the format, layout, or
//! destination usage combination directly.

use std::marker::PhantomData;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::format::{self, TextureFormat, UnsupportedFormat};
use crate::handle::ContentHash;

use super::combine_hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferToTextureBlitKey {
    pub format: TextureFormat,
    pub aspect: format::Aspects,
}

impl ContentHash for BufferToTextureBlitKey {
    fn content_hash(&self) -> u64 {
        combine_hash(&[self.format as u64, self.aspect.bits() as u64])
    }

    fn content_equal(&self, other: &Self) -> bool {
        self == other
    }
}

pub struct BufferToTextureBlitPipeline<B: Backend> {
    pub key: BufferToTextureBlitKey,
    pub pipeline: B::ComputePipeline,
    _marker: PhantomData<B>,
}

impl<B: Backend> ContentHash for BufferToTextureBlitPipeline<B> {
    fn content_hash(&self) -> u64 {
        self.key.content_hash()
    }

    fn content_equal(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<B: Backend> BufferToTextureBlitPipeline<B> {
    pub fn create<C: ShaderCompiler>(
        backend: &B,
        compiler: &C,
        key: BufferToTextureBlitKey,
    ) -> Result<Self, DeviceError> {
        check_supported(key.format).map_err(|UnsupportedFormat(format)| {
            DeviceError::Validation(format!("unsupported buffer-to-texture blit format: {format:?}"))
        })?;
        let source = "\
            @group(0) @binding(0) var<storage, read> src: array<u32>;\n\
            @group(0) @binding(1) var dst: texture_storage_2d<rgba8unorm, write>;\n\
            @compute @workgroup_size(8, 8)\nfn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {\n\
            \u{20}   let value = src[id.y * 256u + id.x];\n\
            \u{20}   textureStore(dst, vec2<i32>(id.xy), unpack4x8unorm(value));\n}\n";
        let (module, info) = compiler.compile_wgsl(source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("buffer-to-texture blit shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_compute_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self { key, pipeline, _marker: PhantomData })
    }
}

fn check_supported(format: TextureFormat) -> Result<(), UnsupportedFormat> {
    if format::BUFFER_TO_TEXTURE_BLIT_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(UnsupportedFormat(format))
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_rejected_before_compiling() {
        let err = check_supported(TextureFormat::Depth32Float).unwrap_err();
        assert_eq!(err.0, TextureFormat::Depth32Float);
    }

    #[test]
    fn every_blit_format_is_supported() {
        for format in format::BUFFER_TO_TEXTURE_BLIT_FORMATS {
            check_supported(*format).unwrap();
        }
    }
}
