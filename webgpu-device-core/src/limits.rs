//! Reified per-device limits.
//!
//! Limits are clamped from adapter limits at device creation;
//! compatibility-mode devices relax certain per-stage storage-binding
//! counts to match the explicit "in-stage" limits the application supplied.

/// The full set of device limits every other component references directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub min_uniform_buffer_offset_alignment: u32,
    pub min_storage_buffer_offset_alignment: u32,
    pub max_storage_buffer_binding_size: u64,
    pub max_bind_groups: u32,
    pub max_compute_workgroups_per_dimension: u32,
    /// Per-stage storage-binding counts, relaxed in compatibility mode to
    /// match what the application explicitly requested "in stage" rather
    /// than the adapter's raw maximum.
    pub max_storage_buffers_per_shader_stage: u32,
    pub max_storage_textures_per_shader_stage: u32,
}

impl Default for Limits {
    fn default() -> Self {
        // Conservative WebGPU baseline ("downlevel") limits.
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            max_storage_buffer_binding_size: 128 << 20,
            max_bind_groups: 4,
            max_compute_workgroups_per_dimension: 65535,
            max_storage_buffers_per_shader_stage: 8,
            max_storage_textures_per_shader_stage: 4,
        }
    }
}

impl Limits {
    /// Clamp `adapter_limits` into `requested`, never granting more than the
    /// adapter can provide.
    pub fn clamp_to_adapter(requested: &Limits, adapter: &Limits) -> Limits {
        Limits {
            min_uniform_buffer_offset_alignment: requested
                .min_uniform_buffer_offset_alignment
                .max(adapter.min_uniform_buffer_offset_alignment),
            min_storage_buffer_offset_alignment: requested
                .min_storage_buffer_offset_alignment
                .max(adapter.min_storage_buffer_offset_alignment),
            max_storage_buffer_binding_size: requested
                .max_storage_buffer_binding_size
                .min(adapter.max_storage_buffer_binding_size),
            max_bind_groups: requested.max_bind_groups.min(adapter.max_bind_groups),
            max_compute_workgroups_per_dimension: requested
                .max_compute_workgroups_per_dimension
                .min(adapter.max_compute_workgroups_per_dimension),
            max_storage_buffers_per_shader_stage: requested
                .max_storage_buffers_per_shader_stage
                .min(adapter.max_storage_buffers_per_shader_stage),
            max_storage_textures_per_shader_stage: requested
                .max_storage_textures_per_shader_stage
                .min(adapter.max_storage_textures_per_shader_stage),
        }
    }

    /// Relax per-stage storage-binding counts for compatibility-mode
    /// devices to match the application-declared in-stage limits, rather
    /// than the tighter cross-stage adapter maximum.
    pub fn relax_for_compatibility_mode(&mut self, in_stage_storage_buffers: u32, in_stage_storage_textures: u32) {
        self.max_storage_buffers_per_shader_stage =
            self.max_storage_buffers_per_shader_stage.max(in_stage_storage_buffers);
        self.max_storage_textures_per_shader_stage =
            self.max_storage_textures_per_shader_stage.max(in_stage_storage_textures);
    }

    pub fn align_up_storage_offset(&self, offset: u64) -> u64 {
        align_up(offset, self.min_storage_buffer_offset_alignment as u64)
    }

    pub fn align_down_storage_offset(&self, offset: u64) -> u64 {
        align_down(offset, self.min_storage_buffer_offset_alignment as u64)
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}
