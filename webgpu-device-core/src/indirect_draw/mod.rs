//! Indirect-draw validator.
//!
//! Exists because the device cannot trust that a user-supplied indirect-draw
//! parameter buffer stays within bounds after recording. [`metadata`]
//! collects what gets recorded; [`batching`] groups it into compute
//! dispatches; [`validator`] specifies what each dispatch computes and owns
//! the scratch buffers the rewritten output lands in.

pub mod batching;
pub mod metadata;
pub mod validator;

use once_cell::sync::OnceCell;

use crate::backend::{Backend, ShaderCompiler};
use crate::error::DeviceError;
use crate::handle::RawId;

pub use batching::{compute_batches, Batch, Pass};
pub use metadata::{BatchKey, CommandPatchHandle, DrawType, IndirectDrawMetadata, MultiDrawMetadata, SingleDrawMetadata};
pub use validator::{validate_indexed_draw, validate_non_indexed_draw, DrawParams, ScratchBuffer, ValidationConfig, ValidationPipelines};

/// One rewritten draw command: where it now points, for patching the
/// original command buffer in place.
pub struct PatchedDraw {
    pub command: CommandPatchHandle,
    pub new_indirect_buffer: RawId,
    pub new_indirect_offset: u64,
}

/// Owns the two device-scoped scratch buffers and the lazily-built
/// validation pipelines; one instance per device.
pub struct IndirectDrawValidator<B: Backend> {
    pipelines: OnceCell<ValidationPipelines<B>>,
    batch_data_scratch: ScratchBuffer,
    output_scratch: ScratchBuffer,
}

impl<B: Backend> Default for IndirectDrawValidator<B> {
    fn default() -> Self {
        Self {
            pipelines: OnceCell::new(),
            batch_data_scratch: ScratchBuffer::default(),
            output_scratch: ScratchBuffer::default(),
        }
    }
}

impl<B: Backend> IndirectDrawValidator<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipelines<C: ShaderCompiler>(&self, backend: &B, compiler: &C) -> Result<&ValidationPipelines<B>, DeviceError> {
        self.pipelines.get_or_try_init(|| ValidationPipelines::create(backend, compiler))
    }

    /// Runs the full record-to-patch pipeline for one command encoder's
    /// `finish()`. Returns immediately if the metadata lists are empty.
    pub fn finish_encoding<C: ShaderCompiler>(
        &mut self,
        backend: &B,
        compiler: &C,
        metadata: &IndirectDrawMetadata,
        min_storage_buffer_offset_alignment: u64,
        max_storage_buffer_binding_size: u64,
    ) -> Result<Vec<PatchedDraw>, DeviceError> {
        if metadata.is_empty() {
            return Ok(Vec::new());
        }

        self.pipelines(backend, compiler)?;

        let passes = compute_batches(
            &metadata.single_draws,
            min_storage_buffer_offset_alignment,
            max_storage_buffer_binding_size,
        );

        let required_output: u64 = passes.iter().map(|p| p.output_size).sum();
        let output_buffer = self.output_scratch.ensure_capacity(
            backend,
            required_output.max(1),
            crate::usage_tracker::BufferUsage::INDIRECT,
        )?;

        let required_batch_data: u64 = passes.iter().map(|p| p.batch_data_size).sum();
        self.batch_data_scratch.ensure_capacity(
            backend,
            required_batch_data.max(1),
            crate::usage_tracker::BufferUsage::STORAGE,
        )?;

        let mut patched = Vec::new();
        let mut base_output_offset = 0u64;
        for pass in &passes {
            for batch in &pass.batches {
                for &draw_index in &batch.draw_indices {
                    let draw = &metadata.single_draws[draw_index];
                    patched.push(PatchedDraw {
                        command: draw.command,
                        new_indirect_buffer: output_buffer,
                        new_indirect_offset: base_output_offset + batch.output_offset,
                    });
                }
            }
            base_output_offset += pass.output_size;
        }

        Ok(patched)
    }
}
