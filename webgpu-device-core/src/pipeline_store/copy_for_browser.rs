//! `copyExternalImageToTexture` / "copy for browser" helper: a full-screen
//! draw that can flip Y, premultiply or unpremultiply alpha, and convert
//! color space in a single pass, composed from independent steps so the
//! device never compiles more shader variants than the application actually
//! exercises.

use std::marker::PhantomData;

use bitflags::bitflags;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::handle::ContentHash;

use super::combine_hash;

bitflags! {
    /// Which conversion steps a given copy-for-browser invocation needs.
    /// A `steps_mask` bitfield so the helper can be content-addressed on
    /// exactly the work it does, not on every field of the originating copy
    /// command.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CopyForBrowserSteps: u8 {
        const FLIP_Y             = 1 << 0;
        const PREMULTIPLY_ALPHA   = 1 << 1;
        const UNPREMULTIPLY_ALPHA = 1 << 2;
        const COLOR_SPACE_CONVERT = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CopyForBrowserKey {
    pub src_format: TextureFormat,
    pub dst_format: TextureFormat,
    pub steps: CopyForBrowserSteps,
}

impl ContentHash for CopyForBrowserKey {
    fn content_hash(&self) -> u64 {
        combine_hash(&[self.src_format as u64, self.dst_format as u64, self.steps.bits() as u64])
    }

    fn content_equal(&self, other: &Self) -> bool {
        self == other
    }
}

pub struct CopyForBrowserPipeline<B: Backend> {
    pub key: CopyForBrowserKey,
    pub pipeline: B::RenderPipeline,
    _marker: PhantomData<B>,
}

impl<B: Backend> ContentHash for CopyForBrowserPipeline<B> {
    fn content_hash(&self) -> u64 {
        self.key.content_hash()
    }

    fn content_equal(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<B: Backend> CopyForBrowserPipeline<B> {
    pub fn create<C: ShaderCompiler>(
        backend: &B,
        compiler: &C,
        key: CopyForBrowserKey,
    ) -> Result<Self, DeviceError> {
        if !crate::format::COPY_FOR_BROWSER_SOURCE_FORMATS.contains(&key.src_format) {
            return Err(DeviceError::Validation(format!(
                "{:?} is not a supported copy-for-browser source format",
                key.src_format
            )));
        }

        let source = generate_wgsl(key.steps);
        let (module, info) = compiler.compile_wgsl(&source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("copy-for-browser shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_render_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self { key, pipeline, _marker: PhantomData })
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

/// Assembles the fragment body out of independent steps, so the device
/// never compiles more of the conversion than a given invocation needs: an
/// sRGB decode, the gamut matrix multiply, and an sRGB encode for
/// `COLOR_SPACE_CONVERT` (the only gamut conversion this helper currently
/// targets is sRGB source content into Display P3), un/premultiply for the
/// alpha steps, and a flipped `y` for `FLIP_Y`.
fn generate_wgsl(steps: CopyForBrowserSteps) -> String {
    let mut body = String::from("var color = textureLoad(src, vec2<i32>(pos.xy), 0);\n");
    if steps.contains(CopyForBrowserSteps::UNPREMULTIPLY_ALPHA) {
        body.push_str("    if (color.a > 0.0) { color = vec4<f32>(color.rgb / color.a, color.a); }\n");
    }
    let needs_color_space_helpers = steps.contains(CopyForBrowserSteps::COLOR_SPACE_CONVERT);
    if needs_color_space_helpers {
        body.push_str(
            "    let linear = vec3<f32>(srgbEotf(color.r), srgbEotf(color.g), srgbEotf(color.b));\n\
             \u{20}   let gamut = SRGB_TO_DISPLAY_P3 * linear;\n\
             \u{20}   color = vec4<f32>(srgbOetf(gamut.r), srgbOetf(gamut.g), srgbOetf(gamut.b), color.a);\n",
        );
    }
    if steps.contains(CopyForBrowserSteps::PREMULTIPLY_ALPHA) {
        body.push_str("    color = vec4<f32>(color.rgb * color.a, color.a);\n");
    }

    let flip = steps.contains(CopyForBrowserSteps::FLIP_Y);
    let y_expr = if flip { "1.0 - y" } else { "y" };

    let color_space_helpers = if needs_color_space_helpers {
        "const SRGB_TO_DISPLAY_P3 = mat3x3<f32>(\n\
         \u{20}   vec3<f32>(0.8224621, 0.0331941, 0.0170827),\n\
         \u{20}   vec3<f32>(0.1775380, 0.9668058, 0.0723974),\n\
         \u{20}   vec3<f32>(0.0000000, 0.0000000, 0.9105199),\n\
         );\n\n\
         fn srgbEotf(c: f32) -> f32 {\n\
         \u{20}   if (c <= 0.04045) { return c / 12.92; }\n\
         \u{20}   return pow((c + 0.055) / 1.055, 2.4);\n}\n\n\
         fn srgbOetf(c: f32) -> f32 {\n\
         \u{20}   if (c <= 0.0031308) { return c * 12.92; }\n\
         \u{20}   return 1.055 * pow(c, 1.0 / 2.4) - 0.055;\n}\n\n"
    } else {
        ""
    };

    format!(
        "@group(0) @binding(0) var src: texture_2d<f32>;\n\n\
         {color_space_helpers}\
         @vertex\nfn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {{\n\
         \u{20}   let x = f32(i32(i) - 1);\n    let y = f32(i32(i & 1u) * 2 - 1);\n\
         \u{20}   return vec4<f32>(x, {y_expr}, 0.0, 1.0);\n}}\n\
         @fragment\nfn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {{\n\
         \u{20}   {body}    return color;\n}}\n",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_source_format_is_rejected_at_creation() {
        // Full creation failure path is covered at the device level via
        // integration tests; here we only check the format gate's source list.
        assert!(!crate::format::COPY_FOR_BROWSER_SOURCE_FORMATS.contains(&TextureFormat::Depth32Float));
    }

    #[test]
    fn steps_mask_participates_in_content_hash() {
        let base = CopyForBrowserKey {
            src_format: TextureFormat::Rgba8Unorm,
            dst_format: TextureFormat::Rgba8Unorm,
            steps: CopyForBrowserSteps::empty(),
        };
        let flipped = CopyForBrowserKey { steps: CopyForBrowserSteps::FLIP_Y, ..base };
        assert_ne!(base.content_hash(), flipped.content_hash());
    }

    #[test]
    fn color_space_convert_emits_the_gamut_matrix_and_transfer_functions() {
        let wgsl = generate_wgsl(CopyForBrowserSteps::COLOR_SPACE_CONVERT);
        assert!(wgsl.contains("SRGB_TO_DISPLAY_P3"));
        assert!(wgsl.contains("srgbEotf"));
        assert!(wgsl.contains("srgbOetf"));
        assert!(!wgsl.contains("color = vec4<f32>(color.rgb, color.a);"));
    }

    #[test]
    fn steps_without_color_space_convert_skip_the_conversion_helpers() {
        let wgsl = generate_wgsl(CopyForBrowserSteps::FLIP_Y | CopyForBrowserSteps::PREMULTIPLY_ALPHA);
        assert!(!wgsl.contains("SRGB_TO_DISPLAY_P3"));
        assert!(!wgsl.contains("srgbEotf"));
        assert!(wgsl.contains("1.0 - y"));
        assert!(wgsl.contains("color.rgb * color.a"));
    }
}
