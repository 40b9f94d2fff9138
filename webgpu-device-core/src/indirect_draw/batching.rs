//! Batching algorithm: groups recorded indirect draws into compute dispatches.
//!
//! Single-draw metadata is walked in recorded order (deterministic) and
//! packed into passes, each pass split into batches that share one compute
//! dispatch. A pass closes and a new one opens the instant either its
//! *output* region or its CPU-side *batch-data* region would exceed
//! `max_storage_buffer_binding_size`.

use super::metadata::{BatchKey, SingleDrawMetadata};

/// One compute dispatch's worth of draws: same batch key, packed into one
/// pass's output region.
#[derive(Debug, Clone)]
pub struct Batch {
    pub key: BatchKey,
    pub draw_indices: Vec<usize>,
    pub output_offset: u64,
    pub output_size: u64,
}

/// One compute-pass worth of batches, bounded by
/// `max_storage_buffer_binding_size` on both the batch-data side and the
/// output side.
#[derive(Debug, Default, Clone)]
pub struct Pass {
    pub batches: Vec<Batch>,
    pub output_size: u64,
    pub batch_data_size: u64,
}

/// Per-draw per-batch record the compute shader consumes as "batch data":
/// fixed-size regardless of draw type, so every draw in a batch occupies
/// the same stride.
const BATCH_DATA_RECORD_SIZE: u64 = 32;

pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Splits `draws` into passes/batches. Grouping is performed via a stable
/// scan that starts a new batch whenever the key changes or capacity is
/// exceeded, so `draws` need not already be grouped contiguously.
pub fn compute_batches(
    draws: &[SingleDrawMetadata],
    min_storage_buffer_offset_alignment: u64,
    max_storage_buffer_binding_size: u64,
) -> Vec<Pass> {
    profiling::scope!("indirect_draw::compute_batches");

    if draws.is_empty() {
        return Vec::new();
    }

    let mut passes: Vec<Pass> = vec![Pass::default()];
    let mut current_batch: Option<Batch> = None;

    for (index, draw) in draws.iter().enumerate() {
        let draw_output_size = draw.output_draw_size();
        let pass = passes.last_mut().unwrap();

        let starts_new_batch = match &current_batch {
            Some(batch) => batch.key != draw.batch,
            None => true,
        };

        if starts_new_batch {
            if let Some(batch) = current_batch.take() {
                pass.batches.push(batch);
            }
            let aligned_offset = align_up(pass.output_size, min_storage_buffer_offset_alignment);
            current_batch = Some(Batch {
                key: draw.batch,
                draw_indices: Vec::new(),
                output_offset: aligned_offset,
                output_size: 0,
            });
            pass.output_size = aligned_offset;
        }

        let batch = current_batch.as_mut().unwrap();
        let would_be_output = batch.output_size + draw_output_size;
        let exceeds_output = pass.output_size + (would_be_output - batch.output_size) > max_storage_buffer_binding_size;
        let exceeds_batch_data = pass.batch_data_size + BATCH_DATA_RECORD_SIZE > max_storage_buffer_binding_size;

        if (exceeds_output || exceeds_batch_data) && !batch.draw_indices.is_empty() {
            // Close out the current batch and pass, start fresh.
            pass.batches.push(current_batch.take().unwrap());
            passes.push(Pass::default());
            let pass = passes.last_mut().unwrap();
            let aligned_offset = align_up(pass.output_size, min_storage_buffer_offset_alignment);
            current_batch = Some(Batch {
                key: draw.batch,
                draw_indices: vec![index],
                output_offset: aligned_offset,
                output_size: draw_output_size,
            });
            pass.output_size = aligned_offset + draw_output_size;
            pass.batch_data_size = BATCH_DATA_RECORD_SIZE;
            continue;
        }

        batch.draw_indices.push(index);
        batch.output_size += draw_output_size;
        pass.output_size += draw_output_size;
        pass.batch_data_size += BATCH_DATA_RECORD_SIZE;
    }

    if let Some(batch) = current_batch.take() {
        passes.last_mut().unwrap().batches.push(batch);
    }

    passes
}
