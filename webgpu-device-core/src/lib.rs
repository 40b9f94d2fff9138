//! Device-resident core of a WebGPU native implementation.
//!
//! Owns the object lifetime and caching model (handles, content cache,
//! format/limit tables), the bookkeeping a render/compute pass needs to hand
//! backend code correct barriers, the device's own menu of helper pipelines,
//! the indirect-draw validator, and the device state machine itself.
//! Backend-specific command submission, the shader compiler, adapter
//! enumeration, and surface presentation all live outside this crate; see
//! [`backend::Backend`] and [`backend::ShaderCompiler`] for the seams they
//! plug into.

mod backend;
mod cache;
mod device;
mod diagnostics;
mod error;
mod format;
mod handle;
mod indirect_draw;
mod limits;
mod naga_compiler;
mod pipeline_store;
mod usage_tracker;

pub use backend::{Backend, BufferDescriptor, ModuleIr, ShaderCompiler, TextureDescriptor};
pub use cache::{CacheStats, CompatibilityToken, CompatibilityTokenMinter, ContentCache};
pub use device::callback::{AsyncPipelineResult, AsyncTaskManager, CallbackQueue, PipelineFuture, QueuedCallback};
pub use device::error_scope::{ErrorScope, ErrorScopeStack, PopError};
pub use device::lost::{LostEvent, LostInfo};
pub use device::state::{IllegalTransition, State};
pub use device::{CacheableObject, Device, DeviceDescriptor, Features, ObjectCaches, Toggles};
pub use diagnostics::{
    utf8_byte_offset_to_utf16, CompilationInfo, CompilationLogRateLimiter, CompilationMessage,
    OffsetConversionError, RateLimitDecision, Severity,
};
pub use error::{AllowedErrors, DeviceError, ErrorKind, LossReason};
pub use format::{Aspects, ComponentType, FormatInfo, SampleTypes, TextureFormat, UnsupportedFormat};
pub use handle::{ContentHash, Entry, RawId, Strong, TypedId, Weak};
pub use indirect_draw::{
    compute_batches, Batch, BatchKey, CommandPatchHandle, DrawParams, DrawType, IndirectDrawMetadata,
    IndirectDrawValidator, MultiDrawMetadata, Pass, PatchedDraw, ScratchBuffer, SingleDrawMetadata,
    ValidationConfig, ValidationPipelines,
};
pub use limits::Limits;
pub use naga_compiler::NagaCompiler;
pub use pipeline_store::{
    should_use_clear_with_draw_helper, BufferToTextureBlitKey, BufferToTextureBlitPipeline, ClearWithDrawKey,
    ClearWithDrawPipeline, CopyForBrowserKey, CopyForBrowserPipeline, CopyForBrowserSteps, DepthToDepthBlitKey,
    DepthToDepthBlitPipeline, LoadOp, PipelineStore, R8ToStencilBlitPipeline, ResolveWithDrawKey,
    ResolveWithDrawPipeline, Rg8ToDepth16UnormBlitPipeline, StencilBitTestPipeline, TimestampQuantizationPipeline,
};
pub use usage_tracker::{
    BindingKind, BufferUsage, PassUsage, PassUsageTracker, ShaderStages, SubresourceRange, TextureSubresourceUsage,
    TextureUsage, UsageAndStages, UsageTrackerError,
};
