//! Compute-shader contract and scratch-buffer management. The validation
//! shader's WGSL text is assembled at runtime from the same parameters this
//! module's [`ValidationConfig`] carries. We keep both: a pure-Rust reference
//! implementation ([`validate_indexed_draw`] / [`validate_non_indexed_draw`])
//! the unit tests exercise directly, and [`generate_shader_source`], which
//! renders the WGSL the compute pipeline actually runs — the two must
//! describe the same contract.

use bytemuck::{Pod, Zeroable};

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::handle::RawId;

use super::metadata::DrawType;

/// Per-draw indirect parameters, laid out the way WebGPU's
/// `drawIndexedIndirect` buffer does: `indexCount, instanceCount,
/// firstIndex, baseVertex, firstInstance`. Non-indexed draws use only the
/// first four fields (`vertexCount, instanceCount, firstVertex,
/// firstInstance`) and leave `base_vertex` at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawParams {
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub base_vertex: u32,
    pub first_instance: u32,
}

/// Everything the compute shader needs beyond the draw's own parameters:
/// one instance of this per batch, bound as the shader's "batch data" input.
#[derive(Clone, Copy, Debug)]
pub struct ValidationConfig {
    pub draw_type: DrawType,
    pub validation_enabled: bool,
    pub duplicate_base_vertex_instance: bool,
    pub use_first_index_offset: bool,
    pub index_buffer_offset_in_elements: u32,
    pub num_index_buffer_elements_low: u32,
    pub num_index_buffer_elements_high: u32,
    pub indirect_first_instance_allowed: bool,
}

/// `None` models the "zero the output slot" failure path: the caller writes
/// all-zero draw parameters for that slot instead of the input.
pub fn validate_non_indexed_draw(input: DrawParams, config: &ValidationConfig) -> Option<DrawParams> {
    if !config.validation_enabled {
        return Some(input);
    }
    if !config.indirect_first_instance_allowed && input.first_instance != 0 {
        return None;
    }
    Some(input)
}

pub fn validate_indexed_draw(input: DrawParams, config: &ValidationConfig) -> Option<DrawParams> {
    if !config.validation_enabled {
        let mut output = input;
        if config.use_first_index_offset {
            output.first = output.first.wrapping_add(config.index_buffer_offset_in_elements);
        }
        return Some(output);
    }

    if !config.indirect_first_instance_allowed && input.first_instance != 0 {
        return None;
    }

    // If numIndexBufferElementsHigh >= 2, the maximum representable
    // firstIndex + indexCount (<= 0x1FFFFFFE) cannot overflow the index
    // buffer; copy unconditionally.
    if config.num_index_buffer_elements_high >= 2 {
        return Some(input);
    }

    // high == 0 or 1: element count fits (with the high bit contributing
    // 2^32) in a u64 computed from the low word; wrapping is intentional
    // when high == 1.
    let num_elements = ((config.num_index_buffer_elements_high as u64) << 32)
        | config.num_index_buffer_elements_low as u64;
    let max_index_count = num_elements.wrapping_sub(input.first as u64) as u32;

    if input.count > max_index_count {
        None
    } else {
        Some(input)
    }
}

/// Applies the `(baseVertex, firstInstance)` duplication prefix used by
/// backends that can't otherwise read those fields as ordinary shader inputs.
pub fn duplicate_prefix(params: &DrawParams, draw_type: DrawType) -> [u32; 2] {
    match draw_type {
        DrawType::Indexed => [params.base_vertex, params.first_instance],
        DrawType::NonIndexed => [params.first, params.first_instance],
    }
}

pub struct ValidationPipelines<B: Backend> {
    pub single_draw: B::ComputePipeline,
    pub multi_draw: B::ComputePipeline,
}

impl<B: Backend> ValidationPipelines<B> {
    pub fn create<C: ShaderCompiler>(backend: &B, compiler: &C) -> Result<Self, DeviceError> {
        let single_source = generate_shader_source(false);
        let (module, info) = compiler.compile_wgsl(&single_source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("indirect single-draw validation shader failed to compile".into()));
        }
        let single_shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let single_layout = backend.create_pipeline_layout_impl()?;
        let single_draw = backend.create_compute_pipeline_uninitialized_impl(&single_shader_module, &single_layout)?;

        let multi_source = generate_shader_source(true);
        let (module, info) = compiler.compile_wgsl(&multi_source, &[])?;
        if info.has_errors() {
            return Err(DeviceError::Internal("indirect multi-draw validation shader failed to compile".into()));
        }
        let multi_shader_module = backend.create_shader_module_impl(&ModuleWrap(module))?;
        let multi_layout = backend.create_pipeline_layout_impl()?;
        let multi_draw = backend.create_compute_pipeline_uninitialized_impl(&multi_shader_module, &multi_layout)?;

        Ok(Self { single_draw, multi_draw })
    }
}

struct ModuleWrap<M>(M);
impl<M: Send + Sync + 'static> crate::backend::ModuleIr for ModuleWrap<M> {}

/// Renders the WGSL the single-draw (`with_draw_count = false`) or
/// multi-draw (`with_draw_count = true`) validation compute pipeline runs.
/// One invocation per draw: reads `DrawParams` out of `src` at
/// `id * batch.inputStrideWords`, applies the same branch-by-branch contract
/// as [`validate_indexed_draw`]/[`validate_non_indexed_draw`], and writes
/// either the (possibly biased) params or an all-zero slot to `dst` at
/// `id * batch.outputStrideWords`. `batch.drawType` (`0` = non-indexed, `1` =
/// indexed) and the two stride fields let one compiled pipeline serve every
/// batch regardless of draw type or duplication, since both only change the
/// per-draw word count, not the validation logic itself.
///
/// `numIndexBufferElementsHigh >= 2` short-circuits to "always valid" as
/// [`validate_indexed_draw`] does; otherwise `maxIndexCount =
/// numIndexBufferElementsLow - firstIndex` (WGSL's `u32` subtraction wraps,
/// matching the reference implementation's `wrapping_sub`) is exactly the
/// 64-bit reference computation truncated to 32 bits, since the high word
/// only ever borrows into bits that get discarded anyway.
pub fn generate_shader_source(with_draw_count: bool) -> String {
    let draw_count_binding = if with_draw_count {
        "@group(0) @binding(3) var<storage, read> drawCount: u32;\n"
    } else {
        ""
    };
    let draw_count_clamp = if with_draw_count {
        "    let numDraws = min(batch.numDraws, drawCount);\n"
    } else {
        "    let numDraws = batch.numDraws;\n"
    };
    format!(
        "struct BatchData {{\n    numDraws: u32,\n    drawType: u32,\n\
         \u{20}   inputStrideWords: u32,\n    outputStrideWords: u32,\n\
         \u{20}   validationEnabled: u32,\n    duplicateBaseVertexInstance: u32,\n\
         \u{20}   useFirstIndexOffset: u32,\n    indexBufferOffsetInElements: u32,\n\
         \u{20}   numIndexBufferElementsLow: u32,\n    numIndexBufferElementsHigh: u32,\n\
         \u{20}   indirectFirstInstanceAllowed: u32,\n}}\n\n\
         @group(0) @binding(0) var<storage, read> batch: BatchData;\n\
         @group(0) @binding(1) var<storage, read> src: array<u32>;\n\
         @group(0) @binding(2) var<storage, read_write> dst: array<u32>;\n\
         {draw_count_binding}\n\
         @compute @workgroup_size(64)\nfn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {{\n\
         \u{20}   let id = gid.x;\n\
         {draw_count_clamp}\
         \u{20}   if (id >= numDraws) {{ return; }}\n\
         \u{20}   let isIndexed = batch.drawType == 1u;\n\
         \u{20}   let base = id * batch.inputStrideWords;\n\
         \u{20}   let outBase = id * batch.outputStrideWords;\n\n\
         \u{20}   let count = src[base + 0u];\n\
         \u{20}   let instanceCount = src[base + 1u];\n\
         \u{20}   var first = src[base + 2u];\n\
         \u{20}   var baseVertex = 0u;\n\
         \u{20}   var firstInstance: u32;\n\
         \u{20}   if (isIndexed) {{\n\
         \u{20}       baseVertex = src[base + 3u];\n\
         \u{20}       firstInstance = src[base + 4u];\n\
         \u{20}   }} else {{\n\
         \u{20}       firstInstance = src[base + 3u];\n\
         \u{20}   }}\n\n\
         \u{20}   var valid = true;\n\
         \u{20}   if (batch.validationEnabled == 0u) {{\n\
         \u{20}       if (isIndexed && batch.useFirstIndexOffset != 0u) {{\n\
         \u{20}           first = first + batch.indexBufferOffsetInElements;\n\
         \u{20}       }}\n\
         \u{20}   }} else {{\n\
         \u{20}       if (batch.indirectFirstInstanceAllowed == 0u && firstInstance != 0u) {{\n\
         \u{20}           valid = false;\n\
         \u{20}       }}\n\
         \u{20}       if (valid && isIndexed && batch.numIndexBufferElementsHigh < 2u) {{\n\
         \u{20}           let maxIndexCount = batch.numIndexBufferElementsLow - first;\n\
         \u{20}           if (count > maxIndexCount) {{\n\
         \u{20}               valid = false;\n\
         \u{20}           }}\n\
         \u{20}       }}\n\
         \u{20}   }}\n\n\
         \u{20}   let dupWords = select(0u, 2u, batch.duplicateBaseVertexInstance != 0u);\n\
         \u{20}   if (!valid) {{\n\
         \u{20}       for (var w = 0u; w < batch.outputStrideWords; w = w + 1u) {{\n\
         \u{20}           dst[outBase + w] = 0u;\n\
         \u{20}       }}\n\
         \u{20}       return;\n\
         \u{20}   }}\n\n\
         \u{20}   let paramsBase = outBase + dupWords;\n\
         \u{20}   dst[paramsBase + 0u] = count;\n\
         \u{20}   dst[paramsBase + 1u] = instanceCount;\n\
         \u{20}   dst[paramsBase + 2u] = first;\n\
         \u{20}   if (isIndexed) {{\n\
         \u{20}       dst[paramsBase + 3u] = baseVertex;\n\
         \u{20}       dst[paramsBase + 4u] = firstInstance;\n\
         \u{20}   }} else {{\n\
         \u{20}       dst[paramsBase + 3u] = firstInstance;\n\
         \u{20}   }}\n\
         \u{20}   if (dupWords == 2u) {{\n\
         \u{20}       if (isIndexed) {{\n\
         \u{20}           dst[outBase + 0u] = baseVertex;\n\
         \u{20}           dst[outBase + 1u] = firstInstance;\n\
         \u{20}       }} else {{\n\
         \u{20}           dst[outBase + 0u] = first;\n\
         \u{20}           dst[outBase + 1u] = firstInstance;\n\
         \u{20}       }}\n\
         \u{20}   }}\n}}\n",
    )
}

/// A device-scoped, monotonically growing scratch buffer. Never shrinks
/// within a device's lifetime; only the validator touches it, and only while
/// holding the device's submission-ordering guarantee, so no internal
/// locking is needed here.
pub struct ScratchBuffer {
    pub buffer: Option<RawId>,
    pub capacity: u64,
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self { buffer: None, capacity: 0 }
    }
}

impl ScratchBuffer {
    /// Ensures the backing buffer is at least `required` bytes, creating or
    /// replacing it only when it must grow.
    pub fn ensure_capacity<B: Backend>(
        &mut self,
        backend: &B,
        required: u64,
        usage: crate::usage_tracker::BufferUsage,
    ) -> Result<RawId, DeviceError> {
        if required > self.capacity {
            let id = backend.create_buffer_impl(&crate::backend::BufferDescriptor {
                size: required,
                usage,
                mapped_at_creation: false,
            })?;
            self.buffer = Some(id);
            self.capacity = required;
        }
        Ok(self.buffer.expect("ensure_capacity always sets buffer before returning"))
    }
}
