//! Device — the root object. Owns every object cache, the internal pipeline
//! store, the indirect-draw validator, the error-scope stack, the lost
//! event, the logging sink, and the async task manager; routes every
//! fallible operation through [`Device::consume_error`].

pub mod callback;
pub mod error_scope;
pub mod lost;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::backend::{Backend, ShaderCompiler};
use crate::cache::{CompatibilityTokenMinter, ContentCache};
use crate::error::{AllowedErrors, DeviceError, ErrorKind, LossReason};
use crate::format::{self, TextureFormat};
use crate::handle::ContentHash;
use crate::indirect_draw::IndirectDrawValidator;
use crate::limits::Limits;
use crate::pipeline_store::PipelineStore;

use callback::{AsyncTaskManager, CallbackQueue, QueuedCallback};
use error_scope::ErrorScopeStack;
use lost::LostEvent;
use state::State;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Features: u32 {
        const TIMESTAMP_QUERY              = 1 << 0;
        const INDIRECT_FIRST_INSTANCE      = 1 << 1;
        const SHADER_F16                   = 1 << 2;
        const MULTI_DRAW_INDIRECT          = 1 << 3;
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Toggles: u32 {
        const IMPLICIT_DEVICE_SYNCHRONIZATION   = 1 << 0;
        const APPLY_CLEAR_BIG_INTEGER_COLOR_VALUE_WITH_DRAW = 1 << 1;
        const SKIP_INDIRECT_DRAW_VALIDATION     = 1 << 2;
    }
}

#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    pub requested_limits: Limits,
    pub features: Features,
    pub toggles: Toggles,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            requested_limits: Limits::default(),
            features: Features::empty(),
            toggles: Toggles::empty(),
        }
    }
}

/// A generic cacheable blueprint type this crate doesn't need to know the
/// shape of beyond content-hashing and a backend-produced handle — bind
/// group layouts, pipeline layouts, samplers, shader modules, render and
/// compute pipelines, and attachment states all instantiate this the same
/// way. Concretely defined by whatever uses a given cache; see the
/// `pipeline_store` module for the richer, purpose-built keys its own
/// caches need.
pub trait CacheableObject: ContentHash + Send + Sync + 'static {}
impl<T: ContentHash + Send + Sync + 'static> CacheableObject for T {}

/// The seven object caches a device owns, one per cacheable object kind.
pub struct ObjectCaches<BindGroupLayout: CacheableObject, PipelineLayout: CacheableObject, ShaderModule: CacheableObject, Sampler: CacheableObject, RenderPipeline: CacheableObject, ComputePipeline: CacheableObject, AttachmentState: CacheableObject> {
    pub bind_group_layouts: ContentCache<BindGroupLayout>,
    pub pipeline_layouts: ContentCache<PipelineLayout>,
    pub shader_modules: ContentCache<ShaderModule>,
    pub samplers: ContentCache<Sampler>,
    pub render_pipelines: ContentCache<RenderPipeline>,
    pub compute_pipelines: ContentCache<ComputePipeline>,
    pub attachment_states: ContentCache<AttachmentState>,
}

impl<A: CacheableObject, B2: CacheableObject, C: CacheableObject, D: CacheableObject, E: CacheableObject, F: CacheableObject, G: CacheableObject> Default for ObjectCaches<A, B2, C, D, E, F, G> {
    fn default() -> Self {
        Self {
            bind_group_layouts: ContentCache::new(),
            pipeline_layouts: ContentCache::new(),
            shader_modules: ContentCache::new(),
            samplers: ContentCache::new(),
            render_pipelines: ContentCache::new(),
            compute_pipelines: ContentCache::new(),
            attachment_states: ContentCache::new(),
        }
    }
}

/// Replaceable application callbacks, independently swappable.
#[derive(Default)]
struct Sinks {
    uncaptured_error: Option<Box<dyn Fn(&DeviceError) + Send + Sync>>,
    logging: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

/// The device-resident root object. Generic over the backend trait and the
/// object types its seven caches hold; front-end code built on top of
/// `Device` never reaches into a concrete backend.
pub struct Device<B: Backend, BGL: CacheableObject, PL: CacheableObject, SM: CacheableObject, S: CacheableObject, RP: CacheableObject, CP: CacheableObject, AS: CacheableObject> {
    backend: B,
    state: parking_lot::Mutex<State>,
    features: Features,
    toggles: Toggles,
    limits: Limits,
    caches: ObjectCaches<BGL, PL, SM, S, RP, CP, AS>,
    pipeline_store: PipelineStore<B>,
    indirect_draw_validator: parking_lot::Mutex<IndirectDrawValidator<B>>,
    error_scopes: parking_lot::Mutex<ErrorScopeStack>,
    // Logging emits take a shared lock; replacing the sink takes an
    // exclusive lock.
    sinks: RwLock<Sinks>,
    lost_event: LostEvent,
    compatibility_tokens: CompatibilityTokenMinter,
    async_tasks: AsyncTaskManager,
    callbacks: parking_lot::Mutex<CallbackQueue>,
    log_rate_limiter: parking_lot::Mutex<crate::diagnostics::CompilationLogRateLimiter>,
    next_execution_serial: AtomicU64,
    last_completed_serial: AtomicU64,
}

impl<B: Backend, BGL: CacheableObject, PL: CacheableObject, SM: CacheableObject, S: CacheableObject, RP: CacheableObject, CP: CacheableObject, AS: CacheableObject> Device<B, BGL, PL, SM, S, RP, CP, AS> {
    pub fn new(backend: B, descriptor: DeviceDescriptor, adapter_limits: Limits) -> Self {
        let limits = Limits::clamp_to_adapter(&descriptor.requested_limits, &adapter_limits);
        Self {
            backend,
            state: parking_lot::Mutex::new(State::BeingCreated),
            features: descriptor.features,
            toggles: descriptor.toggles,
            limits,
            caches: ObjectCaches::default(),
            pipeline_store: PipelineStore::new(),
            indirect_draw_validator: parking_lot::Mutex::new(IndirectDrawValidator::new()),
            error_scopes: parking_lot::Mutex::new(ErrorScopeStack::default()),
            sinks: RwLock::new(Sinks::default()),
            lost_event: LostEvent::default(),
            compatibility_tokens: CompatibilityTokenMinter::default(),
            async_tasks: AsyncTaskManager::new(),
            callbacks: parking_lot::Mutex::new(CallbackQueue::default()),
            log_rate_limiter: parking_lot::Mutex::new(crate::diagnostics::CompilationLogRateLimiter::default()),
            next_execution_serial: AtomicU64::new(1),
            last_completed_serial: AtomicU64::new(0),
        }
    }

    /// Completes device creation: `BeingCreated -> Alive` on success,
    /// `BeingCreated -> Disconnected(FailedCreation)` on failure, backend
    /// destruction skipped in the failure case.
    pub fn initialize(&self, result: Result<(), DeviceError>) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.transition(State::Alive).expect("BeingCreated -> Alive is always legal");
                Ok(())
            }
            Err(err) => {
                state.transition(State::Disconnected).expect("BeingCreated -> Disconnected is always legal");
                self.lost_event.signal(LossReason::FailedCreation, err.to_string());
                Err(err)
            }
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pipeline_store(&self) -> &PipelineStore<B> {
        &self.pipeline_store
    }

    pub fn caches(&self) -> &ObjectCaches<BGL, PL, SM, S, RP, CP, AS> {
        &self.caches
    }

    pub fn lost_event(&self) -> &LostEvent {
        &self.lost_event
    }

    pub fn get_format(&self, format: TextureFormat) -> Result<&'static format::FormatInfo, format::UnsupportedFormat> {
        format::get_format(format)
    }

    pub fn mint_compatibility_token(&self) -> crate::cache::CompatibilityToken {
        self.compatibility_tokens.mint()
    }

    pub fn set_uncaptured_error_callback(&self, callback: impl Fn(&DeviceError) + Send + Sync + 'static) {
        self.sinks.write().uncaptured_error = Some(Box::new(callback));
    }

    pub fn set_logging_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.sinks.write().logging = Some(Box::new(callback));
    }

    /// Rate-limited: first 20 pass, 20th is a final notice, the rest dropped.
    pub fn log(&self, message: &str) {
        use crate::diagnostics::RateLimitDecision;
        let decision = self.log_rate_limiter.lock().next();
        let sinks = self.sinks.read();
        if let Some(logging) = &sinks.logging {
            match decision {
                RateLimitDecision::Emit => logging(message),
                RateLimitDecision::EmitFinalNotice => logging("compilation log limit reached; further messages are dropped"),
                RateLimitDecision::Drop => {}
            }
        }
    }

    pub fn push_error_scope(&self, filter: AllowedErrors) {
        self.error_scopes.lock().push(filter);
    }

    pub fn pop_error_scope(&self) -> Result<Option<DeviceError>, error_scope::PopError> {
        self.error_scopes.lock().pop()
    }

    /// Routes an error against `additional_allowed` union the always-allowed
    /// `{Validation, DeviceLost}` mask. Errors outside that mask are fatal
    /// and force device loss.
    pub fn consume_error(&self, error: DeviceError, additional_allowed: AllowedErrors) {
        let mask = AllowedErrors::with(additional_allowed);
        let kind = error.kind();

        if mask.allows(kind) {
            let consumed = self.error_scopes.lock().offer(error.clone());
            if !consumed && self.state() == State::Alive {
                log::warn!("uncaptured device error: {error}");
                let sinks = self.sinks.read();
                if let Some(callback) = &sinks.uncaptured_error {
                    callback(&error);
                } else {
                    drop(sinks);
                    self.callbacks.lock().push(QueuedCallback::UncapturedError(error));
                }
            }
            return;
        }

        log::error!("fatal device error, forcing device loss: {error}");
        self.force_loss(LossReason::Unknown, error.to_string());
    }

    /// Forces the fatal path: transition through `BeingDisconnected` to
    /// `Disconnected`, signal the lost event, drain outstanding async work
    /// with a lost status.
    pub fn force_loss(&self, reason: LossReason, message: impl Into<String>) {
        let message = message.into();
        log::info!("device lost: {reason:?}: {message}");
        {
            let mut state = self.state.lock();
            if *state == State::Disconnected || *state == State::Destroyed {
                return;
            }
            if state.transition(State::BeingDisconnected).is_ok() {
                state.transition(State::Disconnected).expect("BeingDisconnected -> Disconnected is always legal");
            } else {
                *state = State::Disconnected;
            }
        }

        // Clear the sinks before firing so a callback is free to drop the
        // memory backing them.
        let mut sinks = self.sinks.write();
        sinks.uncaptured_error = None;
        sinks.logging = None;
        drop(sinks);

        self.lost_event.signal(reason, message);
        self.async_tasks.wait_all_pending_tasks();
        let drained = self.callbacks.lock().handle_shutdown(reason);
        // Draining here just empties the queue; an application-facing shim
        // outside this crate is responsible for actually invoking each
        // `QueuedCallback`.
        let _ = drained;
    }

    /// Callbacks attached to serial `S` fire only after `last-completed >=
    /// S`. Called by backend submission once a serial completes; the
    /// submission path itself lives outside this crate, but the serial
    /// counters are this crate's responsibility.
    pub fn next_execution_serial(&self) -> u64 {
        self.next_execution_serial.fetch_add(1, Ordering::SeqCst)
    }

    pub fn mark_serial_completed(&self, serial: u64) {
        self.last_completed_serial.fetch_max(serial, Ordering::SeqCst);
    }

    pub fn last_completed_serial(&self) -> u64 {
        self.last_completed_serial.load(Ordering::SeqCst)
    }

    /// Idempotent: two back-to-back calls with no intervening submission
    /// both return "idle, no more work." Draining an empty callback queue
    /// and ticking the backend are both naturally idempotent here since
    /// neither mutates anything when there's nothing to do.
    pub fn tick(&self) -> Result<(), DeviceError> {
        if !self.state().accepts_work() {
            return Ok(());
        }
        self.backend.tick_impl()?;
        Ok(())
    }

    /// Async pipeline creation: cached pipelines (already resolved by the
    /// time this is called) complete immediately; a cache miss spawns the
    /// work on the async task manager.
    pub fn create_render_pipeline_async(
        &self,
        backend_work: impl FnOnce() -> Result<RP, DeviceError> + Send + 'static,
        cached: Option<RP>,
    ) -> callback::PipelineFuture<RP>
    where
        RP: Send,
    {
        match cached {
            Some(pipeline) => self.async_tasks.complete_immediately(Ok(pipeline)),
            None => self.async_tasks.spawn(backend_work),
        }
    }

    /// Without this toggle, the application must externally serialize access
    /// to the device. With it enabled, a per-device reentrant mutex does
    /// that instead: the `implicit-device-synchronization` feature selects a
    /// `ReentrantMutex`-guarded entry point at the call site that wraps this
    /// device, while the device itself stays agnostic to which policy is
    /// active.
    pub fn implicit_synchronization_enabled(&self) -> bool {
        self.toggles.contains(Toggles::IMPLICIT_DEVICE_SYNCHRONIZATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CompilationInfo;
    use crate::handle::RawId;

    #[derive(Clone, Copy)]
    struct Dummy;
    impl ContentHash for Dummy {
        fn content_hash(&self) -> u64 {
            0
        }
        fn content_equal(&self, _other: &Self) -> bool {
            true
        }
    }

    struct NoopBackend;
    impl Backend for NoopBackend {
        type ShaderModule = ();
        type BindGroupLayout = ();
        type PipelineLayout = ();
        type RenderPipeline = ();
        type ComputePipeline = ();
        type Sampler = ();

        fn create_buffer_impl(&self, _desc: &crate::backend::BufferDescriptor) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn create_texture_impl(&self, _desc: &crate::backend::TextureDescriptor) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn create_texture_view_impl(&self, _texture: RawId) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn create_sampler_impl(&self) -> Result<Self::Sampler, DeviceError> {
            Ok(())
        }
        fn create_bind_group_layout_impl(&self) -> Result<Self::BindGroupLayout, DeviceError> {
            Ok(())
        }
        fn create_pipeline_layout_impl(&self) -> Result<Self::PipelineLayout, DeviceError> {
            Ok(())
        }
        fn create_bind_group_impl(&self) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn create_shader_module_impl(&self, _module: &dyn crate::backend::ModuleIr) -> Result<Self::ShaderModule, DeviceError> {
            Ok(())
        }
        fn create_render_pipeline_uninitialized_impl(
            &self,
            _shader: &Self::ShaderModule,
            _layout: &Self::PipelineLayout,
        ) -> Result<Self::RenderPipeline, DeviceError> {
            Ok(())
        }
        fn create_compute_pipeline_uninitialized_impl(
            &self,
            _shader: &Self::ShaderModule,
            _layout: &Self::PipelineLayout,
        ) -> Result<Self::ComputePipeline, DeviceError> {
            Ok(())
        }
        fn create_query_set_impl(&self) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn create_swap_chain_impl(&self) -> Result<RawId, DeviceError> {
            unimplemented!()
        }
        fn tick_impl(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn destroy_impl(&self) {}
        fn copy_from_staging_to_buffer_impl(&self, _staging: RawId, _dst: RawId, _size: u64) -> Result<(), DeviceError> {
            Ok(())
        }
        fn copy_from_staging_to_texture_impl(&self, _staging: RawId, _dst: RawId) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    type TestDevice = Device<NoopBackend, Dummy, Dummy, Dummy, Dummy, Dummy, Dummy, Dummy>;

    fn alive_device() -> TestDevice {
        let device = Device::new(NoopBackend, DeviceDescriptor::default(), Limits::default());
        device.initialize(Ok(())).unwrap();
        device
    }

    #[test]
    fn new_device_starts_being_created_then_initializes_to_alive() {
        let device = Device::new(NoopBackend, DeviceDescriptor::default(), Limits::default());
        assert_eq!(device.state(), State::BeingCreated);
        device.initialize(Ok(())).unwrap();
        assert_eq!(device.state(), State::Alive);
    }

    #[test]
    fn failed_initialization_lands_on_disconnected_with_failed_creation_reason() {
        let device = Device::new(NoopBackend, DeviceDescriptor::default(), Limits::default());
        let err = device.initialize(Err(DeviceError::Internal("backend init failed".into())));
        assert!(err.is_err());
        assert_eq!(device.state(), State::Disconnected);
        assert_eq!(device.lost_event().try_get().unwrap().reason, LossReason::FailedCreation);
    }

    #[test]
    fn validation_error_is_captured_by_an_open_scope_not_the_uncaptured_callback() {
        let device = alive_device();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        device.set_uncaptured_error_callback(move |_| fired_clone.store(true, Ordering::SeqCst));

        device.push_error_scope(AllowedErrors::ALWAYS);
        device.consume_error(DeviceError::Validation("bad bind group".into()), AllowedErrors::empty());
        let popped = device.pop_error_scope().unwrap();

        assert!(popped.is_some());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn an_internal_error_forces_device_loss() {
        let device = alive_device();
        device.consume_error(DeviceError::Internal("compute dispatch faulted".into()), AllowedErrors::empty());
        assert_eq!(device.state(), State::Disconnected);
        assert_eq!(device.lost_event().try_get().unwrap().reason, LossReason::Unknown);
        assert!(!device.state().accepts_work());
    }

    #[test]
    fn tick_is_idempotent_at_steady_idle() {
        let device = alive_device();
        device.tick().unwrap();
        device.tick().unwrap();
    }

    #[test]
    fn compatibility_tokens_from_the_device_are_never_explicit() {
        let device = alive_device();
        let token = device.mint_compatibility_token();
        assert!(!token.is_explicit());
    }

    #[test]
    fn uncaptured_error_fires_when_no_scope_is_open() {
        let device = alive_device();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = fired.clone();
        device.set_uncaptured_error_callback(move |_| fired_clone.store(true, Ordering::SeqCst));
        device.consume_error(DeviceError::Validation("no scope open".into()), AllowedErrors::empty());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn force_loss_clears_sinks_before_signalling() {
        let device = alive_device();
        device.set_logging_callback(|_| {});
        device.force_loss(LossReason::Destroyed, "shutdown");
        // Logging after loss is a silent no-op: the sink was cleared.
        device.log("should not panic");
    }

    #[test]
    fn shader_compiler_type_param_compiles_generically() {
        struct NoopCompiler;
        struct NoopModule;
        impl crate::backend::ModuleIr for NoopModule {}
        impl ShaderCompiler for NoopCompiler {
            type Module = NoopModule;
            fn compile_wgsl(&self, _source: &str, _allowed_extensions: &[&str]) -> Result<(Self::Module, CompilationInfo), DeviceError> {
                Ok((NoopModule, CompilationInfo::default()))
            }
        }
        let device = alive_device();
        let _ = device.pipeline_store();
        let _compiler = NoopCompiler;
    }
}
