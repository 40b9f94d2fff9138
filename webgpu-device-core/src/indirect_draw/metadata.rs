//! Record-time metadata collection: what a command encoder remembers about
//! each indirect draw as it's recorded, so the validator has something to
//! batch once the encoder finishes.

use crate::handle::RawId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawType {
    Indexed,
    NonIndexed,
}

/// Groups draws that can share one compute dispatch: same source buffer,
/// same draw type, same duplication requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub source_indirect_buffer: RawId,
    pub draw_type: DrawType,
    pub duplicate_base_vertex_instance: bool,
}

/// Opaque reference to the recorded command whose `{indirect-buffer,
/// indirect-offset}` pair gets rewritten at `finish()` time, once the output
/// buffer's final layout is known. Concretely an index into the command
/// encoder's command list; kept opaque here since command recording itself
/// lives outside this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandPatchHandle(pub usize);

/// A single indirect (or indexed-indirect) draw recorded into a command
/// encoder.
#[derive(Clone, Copy, Debug)]
pub struct SingleDrawMetadata {
    pub batch: BatchKey,
    pub command: CommandPatchHandle,
    pub input_buffer_offset: u64,
    /// Split because the validation shader operates in 32-bit integer math.
    pub index_buffer_element_count_low: u32,
    pub index_buffer_element_count_high: u32,
    pub index_buffer_offset_in_elements: u32,
}

impl SingleDrawMetadata {
    pub fn index_buffer_element_count(&self) -> u64 {
        ((self.index_buffer_element_count_high as u64) << 32) | self.index_buffer_element_count_low as u64
    }

    /// Size, in bytes, of this draw's indirect-parameter block: 5 u32s for
    /// indexed (`indexCount, instanceCount, firstIndex, baseVertex,
    /// firstInstance`), 4 for non-indexed.
    pub fn input_draw_size(&self) -> u64 {
        match self.batch.draw_type {
            DrawType::Indexed => 5 * 4,
            DrawType::NonIndexed => 4 * 4,
        }
    }

    /// Output slot size: input size, plus two extra u32s
    /// (`baseVertex`/`firstInstance` duplication prefix) when the backend
    /// needs them exposed as an ordinary shader input.
    pub fn output_draw_size(&self) -> u64 {
        self.input_draw_size() + if self.batch.duplicate_base_vertex_instance { 2 * 4 } else { 0 }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MultiDrawMetadata {
    pub command: CommandPatchHandle,
    pub draw_type: DrawType,
    pub max_draw_count: u32,
    pub draw_count_buffer: Option<(RawId, u64)>,
    pub index_buffer_byte_size: u64,
    pub duplicate_base_vertex_instance: bool,
}

impl MultiDrawMetadata {
    pub fn output_draw_size(&self) -> u64 {
        let input = match self.draw_type {
            DrawType::Indexed => 5 * 4,
            DrawType::NonIndexed => 4 * 4,
        };
        input + if self.duplicate_base_vertex_instance { 2 * 4 } else { 0 }
    }

    pub fn output_size(&self) -> u64 {
        self.max_draw_count as u64 * self.output_draw_size()
    }

    /// When `duplicate_base_vertex_instance` is false and either the draw is
    /// non-indexed or validation is disabled, there's nothing to patch and
    /// the buffer is forwarded untouched.
    pub fn needs_validation_pass(&self, validation_enabled: bool) -> bool {
        if !self.duplicate_base_vertex_instance
            && (self.draw_type == DrawType::NonIndexed || !validation_enabled)
        {
            return false;
        }
        true
    }
}

/// Accumulates metadata for one command encoder's lifetime, emptied by
/// `finish()` via [`crate::indirect_draw::batching::compute_batches`].
#[derive(Default)]
pub struct IndirectDrawMetadata {
    pub single_draws: Vec<SingleDrawMetadata>,
    pub multi_draws: Vec<MultiDrawMetadata>,
}

impl IndirectDrawMetadata {
    pub fn is_empty(&self) -> bool {
        self.single_draws.is_empty() && self.multi_draws.is_empty()
    }

    pub fn record_single_draw(&mut self, draw: SingleDrawMetadata) {
        self.single_draws.push(draw);
    }

    pub fn record_multi_draw(&mut self, draw: MultiDrawMetadata) {
        self.multi_draws.push(draw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> RawId {
        use slotmap::Key;
        RawId::from(slotmap::KeyData::from_ffi(n))
    }

    #[test]
    fn empty_metadata_skips_the_whole_pass() {
        assert!(IndirectDrawMetadata::default().is_empty());
    }

    #[test]
    fn element_count_reassembles_from_split_halves() {
        let draw = SingleDrawMetadata {
            batch: BatchKey { source_indirect_buffer: id(1), draw_type: DrawType::Indexed, duplicate_base_vertex_instance: false },
            command: CommandPatchHandle(0),
            input_buffer_offset: 0,
            index_buffer_element_count_low: 5,
            index_buffer_element_count_high: 1,
            index_buffer_offset_in_elements: 0,
        };
        assert_eq!(draw.index_buffer_element_count(), (1u64 << 32) | 5);
    }

    #[test]
    fn duplication_adds_two_u32s_to_output_size() {
        let base = SingleDrawMetadata {
            batch: BatchKey { source_indirect_buffer: id(1), draw_type: DrawType::NonIndexed, duplicate_base_vertex_instance: false },
            command: CommandPatchHandle(0),
            input_buffer_offset: 0,
            index_buffer_element_count_low: 0,
            index_buffer_element_count_high: 0,
            index_buffer_offset_in_elements: 0,
        };
        assert_eq!(base.output_draw_size(), 16);
        let duplicating = SingleDrawMetadata {
            batch: BatchKey { duplicate_base_vertex_instance: true, ..base.batch },
            ..base
        };
        assert_eq!(duplicating.output_draw_size(), 24);
    }

    #[test]
    fn multi_draw_skips_validation_pass_when_non_indexed_and_no_duplication() {
        let draw = MultiDrawMetadata {
            command: CommandPatchHandle(0),
            draw_type: DrawType::NonIndexed,
            max_draw_count: 10,
            draw_count_buffer: None,
            index_buffer_byte_size: 0,
            duplicate_base_vertex_instance: false,
        };
        assert!(!draw.needs_validation_pass(true));
        assert!(!draw.needs_validation_pass(false));
    }

    #[test]
    fn multi_draw_needs_validation_when_duplicating_even_if_non_indexed() {
        let draw = MultiDrawMetadata {
            command: CommandPatchHandle(0),
            draw_type: DrawType::NonIndexed,
            max_draw_count: 10,
            draw_count_buffer: None,
            index_buffer_byte_size: 0,
            duplicate_base_vertex_instance: true,
        };
        assert!(draw.needs_validation_pass(true));
    }
}
