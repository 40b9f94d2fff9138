//! R8-to-stencil blit helper.
//!
//! Backends that cannot write a stencil aspect directly from a staging
//! buffer copy instead encode the target stencil values into an R8Uint
//! texture and run one "clear" pass per bit (the stencil test only ever
//! needs to know whether a given bit survives a reference-value + compare
//! function, so the helper renders 8 single-bit passes, one per stencil
//! bit, instead of one arbitrary-value pass).
//!
//! This family has no content variation worth caching per-instance — a
//! device either needs the helper or it doesn't — so it's a singleton, not
//! a `ContentCache` entry.

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;

pub struct StencilBitTestPipeline<B: Backend> {
    pub bit: u8,
    pub pipeline: B::RenderPipeline,
}

pub struct R8ToStencilBlitPipeline<B: Backend> {
    pub clear_pipeline: B::RenderPipeline,
    /// One bit-test pass per stencil bit, indexed `0..8`.
    pub bit_tests: Vec<StencilBitTestPipeline<B>>,
}

impl<B: Backend> R8ToStencilBlitPipeline<B> {
    pub fn create<C: ShaderCompiler>(backend: &B, compiler: &C) -> Result<Self, DeviceError> {
        let clear_source = "\
            @group(0) @binding(0) var src: texture_2d<u32>;\n\
            @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
            \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
            \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}\n\
            @fragment\nfn fs_main() { }\n";
        let (clear_module, info) = compiler.compile_wgsl(clear_source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("r8-to-stencil clear shader failed to compile".into()));
        }
        let clear_shader_module = backend.create_shader_module_impl(&ModuleWrap(clear_module))?;
        let clear_layout = backend.create_pipeline_layout_impl()?;
        let clear_pipeline = backend.create_render_pipeline_uninitialized_impl(&clear_shader_module, &clear_layout)?;

        let mut bit_tests = Vec::with_capacity(8);
        for bit in 0..8u8 {
            let source = format!(
                "@group(0) @binding(0) var src: texture_2d<u32>;\n\
                 @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {{\n\
                 \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
                 \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}}\n\
                 @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) {{\n\
                 \u{20}   let texel = textureLoad(src, vec2<i32>(pos.xy), 0).r;\n\
                 \u{20}   if ((texel & (1u << {bit}u)) == 0u) {{ discard; }}\n}}\n"
            );
            let (module, info) = compiler.compile_wgsl(&source, &[])?;
            if info.has_errors() {
                return Err(DeviceError::Internal(format!(
                    "r8-to-stencil bit-test shader for bit {bit} failed to compile"
                )));
            }
            let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
            let layout = backend.create_pipeline_layout_impl()?;
            let pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;
            bit_tests.push(StencilBitTestPipeline { bit, pipeline });
        }

        Ok(Self { clear_pipeline, bit_tests })
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

#[cfg(test)]
mod tests {
    #[test]
    fn eight_bit_test_passes_cover_every_stencil_bit() {
        let bits: Vec<u8> = (0..8).collect();
        assert_eq!(bits, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }
}
