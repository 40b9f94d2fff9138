//! Backend and shader-compiler seams.
//!
//! Backend-specific submission (Vulkan/Metal/D3D12) lives entirely outside
//! this crate; this module only specifies the trait boundary the device
//! core talks to. `Backend` stays a public trait, not something hidden
//! behind inherent methods on a concrete type, since the whole point is
//! that `Device<B: Backend>` is generic over it.

use crate::diagnostics::CompilationInfo;
use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::handle::RawId;

/// Opaque shader-module IR handle returned by a [`ShaderCompiler`]. The
/// compiler is an external collaborator; this crate never inspects the IR
/// itself, only forwards it to [`Backend::create_shader_module_impl`].
pub trait ModuleIr: Send + Sync + 'static {}

/// `compile(source) -> module + diagnostics`.
pub trait ShaderCompiler {
    type Module: ModuleIr;

    fn compile_wgsl(
        &self,
        source: &str,
        allowed_extensions: &[&str],
    ) -> Result<(Self::Module, CompilationInfo), DeviceError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: crate::usage_tracker::BufferUsage,
    pub mapped_at_creation: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureDescriptor {
    pub format: TextureFormat,
    pub size: [u32; 3],
    pub mip_level_count: u32,
    pub sample_count: u32,
}

/// The backend trait: at least these entry points, one implementation per
/// backend (Vulkan/Metal/D3D12/GL — all out of scope here). Front-end code
/// is generic over this trait; it never calls a concrete backend directly.
pub trait Backend: Send + Sync + 'static {
    type ShaderModule: Send + Sync;
    type BindGroupLayout: Send + Sync;
    type PipelineLayout: Send + Sync;
    type RenderPipeline: Send + Sync;
    type ComputePipeline: Send + Sync;
    type Sampler: Send + Sync;

    fn create_buffer_impl(&self, desc: &BufferDescriptor) -> Result<RawId, DeviceError>;
    fn create_texture_impl(&self, desc: &TextureDescriptor) -> Result<RawId, DeviceError>;
    fn create_texture_view_impl(&self, texture: RawId) -> Result<RawId, DeviceError>;
    fn create_sampler_impl(&self) -> Result<Self::Sampler, DeviceError>;
    fn create_bind_group_layout_impl(&self) -> Result<Self::BindGroupLayout, DeviceError>;
    fn create_pipeline_layout_impl(&self) -> Result<Self::PipelineLayout, DeviceError>;
    fn create_bind_group_impl(&self) -> Result<RawId, DeviceError>;
    fn create_shader_module_impl(&self, module: &dyn ModuleIr) -> Result<Self::ShaderModule, DeviceError>;
    /// `shader` is the module returned by the preceding
    /// [`Backend::create_shader_module_impl`] call — a real backend reads
    /// entry points and bindings off of it while building the pipeline.
    fn create_render_pipeline_uninitialized_impl(
        &self,
        shader: &Self::ShaderModule,
        layout: &Self::PipelineLayout,
    ) -> Result<Self::RenderPipeline, DeviceError>;
    fn create_compute_pipeline_uninitialized_impl(
        &self,
        shader: &Self::ShaderModule,
        layout: &Self::PipelineLayout,
    ) -> Result<Self::ComputePipeline, DeviceError>;
    fn create_query_set_impl(&self) -> Result<RawId, DeviceError>;
    fn create_swap_chain_impl(&self) -> Result<RawId, DeviceError>;
    fn tick_impl(&self) -> Result<(), DeviceError>;
    fn destroy_impl(&self);
    fn copy_from_staging_to_buffer_impl(&self, staging: RawId, dst: RawId, size: u64) -> Result<(), DeviceError>;
    fn copy_from_staging_to_texture_impl(&self, staging: RawId, dst: RawId) -> Result<(), DeviceError>;

    /// Whether this backend converts multi-draw-indirect into a native
    /// construct (e.g. Metal's indirect command buffer) that validates
    /// inline, short-circuiting the multi-draw compute validation path.
    fn will_validate_multi_draw_natively(&self) -> bool {
        false
    }

    /// Whether this backend supports `IndexBufferOffset` natively; if not,
    /// the validator biases `firstIndex` instead.
    fn supports_index_buffer_offset(&self) -> bool {
        true
    }

    fn allows_indirect_first_instance(&self) -> bool {
        true
    }
}
