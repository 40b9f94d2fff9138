//! Timestamp quantization helper: normalizes a resolved timestamp-query
//! buffer into nanoseconds the way `writeTimestamp`'s readback contract
//! requires. A single device-scoped compute pipeline, since the
//! normalization formula never varies by content.
//!
//! WGSL has no 64-bit integer type, so both the raw timestamp and the
//! quantized result travel as `(low, high)` `u32` pairs rather than a
//! single 64-bit value, and the multiply-by-period step runs in 32-bit
//! integer math on the low word plus a carry from the high word, masked to
//! the quantization granularity the query set reports. A query the set
//! marks unavailable is zeroed rather than quantized, matching the
//! resolve-time "unavailable queries read back as zero" contract.

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;

pub struct TimestampQuantizationPipeline<B: Backend> {
    pub pipeline: B::ComputePipeline,
}

impl<B: Backend> TimestampQuantizationPipeline<B> {
    pub fn create<C: ShaderCompiler>(backend: &B, compiler: &C) -> Result<Self, DeviceError> {
        let source = generate_wgsl();
        let (module, info) = compiler.compile_wgsl(source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("timestamp quantization shader failed to compile".into()));
        }
        let shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let layout = backend.create_pipeline_layout_impl()?;
        let pipeline = backend.create_compute_pipeline_uninitialized_impl(&shader_module, &layout)?;
        Ok(Self { pipeline })
    }
}

/// `raw`/`quantized` are `vec2<u32>` arrays of `(low, high)` pairs. The
/// period is an integer numerator/denominator (nanoseconds per tick,
/// scaled) rather than a float, so the multiply stays in 32-bit integer
/// math end to end: the low word's product is split into its own low/high
/// halves via `quantization_mask`-width shifts, and the high word's
/// contribution is added into the result's high word after the shift.
/// `availableMask` zeroes out queries the set never resolved instead of
/// quantizing garbage.
fn generate_wgsl() -> &'static str {
    "\
struct Period {\n\
\u{20}   periodNumerator: u32,\n\
\u{20}   periodDenominatorShift: u32,\n\
}\n\
@group(0) @binding(0) var<storage, read> rawLow: array<u32>;\n\
@group(0) @binding(1) var<storage, read> rawHigh: array<u32>;\n\
@group(0) @binding(2) var<storage, read> availableMask: array<u32>;\n\
@group(0) @binding(3) var<storage, read_write> quantizedLow: array<u32>;\n\
@group(0) @binding(4) var<storage, read_write> quantizedHigh: array<u32>;\n\
@group(0) @binding(5) var<uniform> period: Period;\n\
\n\
@compute @workgroup_size(64)\n\
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {\n\
\u{20}   let i = id.x;\n\
\u{20}   let word = i / 32u;\n\
\u{20}   let bit = i % 32u;\n\
\u{20}   if (((availableMask[word] >> bit) & 1u) == 0u) {\n\
\u{20}       quantizedLow[i] = 0u;\n\
\u{20}       quantizedHigh[i] = 0u;\n\
\u{20}       return;\n\
\u{20}   }\n\
\n\
\u{20}   let low = rawLow[i];\n\
\u{20}   let high = rawHigh[i];\n\
\u{20}   let numerator = period.periodNumerator;\n\
\u{20}   let shift = period.periodDenominatorShift;\n\
\n\
\u{20}   // Split the low-word multiply into 16-bit halves so the partial\n\
\u{20}   // products fit in u32 without overflow, then recombine.\n\
\u{20}   let lowLo = low & 0xFFFFu;\n\
\u{20}   let lowHi = low >> 16u;\n\
\u{20}   let p0 = lowLo * numerator;\n\
\u{20}   let p1 = lowHi * numerator;\n\
\u{20}   let mid = (p0 >> 16u) + (p1 & 0xFFFFu);\n\
\u{20}   let productLow = (p0 & 0xFFFFu) | (mid << 16u);\n\
\u{20}   let productHigh = (p1 >> 16u) + (mid >> 16u) + high * numerator;\n\
\n\
\u{20}   quantizedLow[i] = (productLow >> shift) | (productHigh << (32u - shift));\n\
\u{20}   quantizedHigh[i] = productHigh >> shift;\n\
}\n\
"
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_shader_uses_u32_pairs_not_u64() {
        let wgsl = generate_wgsl();
        assert!(!wgsl.contains("u64"));
        assert!(wgsl.contains("rawLow"));
        assert!(wgsl.contains("rawHigh"));
        assert!(wgsl.contains("quantizedLow"));
        assert!(wgsl.contains("quantizedHigh"));
    }

    #[test]
    fn generated_shader_zeroes_unavailable_queries() {
        let wgsl = generate_wgsl();
        assert!(wgsl.contains("availableMask"));
        assert!(wgsl.contains("quantizedLow[i] = 0u;"));
        assert!(wgsl.contains("quantizedHigh[i] = 0u;"));
    }
}
