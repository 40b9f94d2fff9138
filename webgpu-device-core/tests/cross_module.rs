//! Cross-module scenarios that don't fit cleanly inside a single module's
//! unit tests: a cache race across threads, the big-int clear gating
//! decision, and a device-loss cascade driven entirely through `Device`.
//!
//! Indirect-draw validation pass/fail and error-scope capture are exercised
//! in `indirect_draw::validator`'s and `device::error_scope`'s own unit
//! tests instead, since they don't need a full `Device` to demonstrate.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use webgpu_device_core::*;

#[derive(Clone)]
struct BindGroupLayoutBlueprint {
    entry_count: u32,
}

impl ContentHash for BindGroupLayoutBlueprint {
    fn content_hash(&self) -> u64 {
        self.entry_count as u64
    }
    fn content_equal(&self, other: &Self) -> bool {
        self.entry_count == other.entry_count
    }
}

/// Two threads racing `get_or_create` with identical content see at most
/// one backend construction win; both end up pointing at the same stored
/// entry.
#[test]
fn cache_race_leaves_exactly_one_winner() {
    let cache: Arc<ContentCache<BindGroupLayoutBlueprint>> = Arc::new(ContentCache::new());
    let construction_calls = Arc::new(AtomicU32::new(0));
    let blueprint = BindGroupLayoutBlueprint { entry_count: 4 };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let blueprint = blueprint.clone();
            let calls = construction_calls.clone();
            std::thread::spawn(move || {
                cache
                    .get_or_create::<(), _>(&blueprint, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(blueprint.clone())
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for pair in results.windows(2) {
        assert!(pair[0].ptr_eq(&pair[1]), "every caller must observe the same stored entry");
    }
    assert_eq!(cache.live_count(), 1);
    // At least one construction happened; losing racers' outputs were
    // discarded rather than stored.
    assert!(construction_calls.load(Ordering::SeqCst) >= 1);
}

/// The clear-with-draw helper (the path responsible for exact big-int
/// clear-color readback on integer formats) only ever participates when the
/// attachment's load op is `Clear`.
#[test]
fn big_int_clear_only_routes_through_clear_with_draw_on_load_op_clear() {
    assert!(should_use_clear_with_draw_helper(LoadOp::Clear));
    assert!(!should_use_clear_with_draw_helper(LoadOp::Load));

    let key = ClearWithDrawKey {
        color_formats: [Some(TextureFormat::R32Uint), None, None, None, None, None, None, None],
        depth_stencil_format: None,
        sample_count: 1,
        attachments_to_clear_mask: 0b1,
    };
    assert!(key.clears_color(0));
}

struct NoopBackend;

impl Backend for NoopBackend {
    type ShaderModule = ();
    type BindGroupLayout = ();
    type PipelineLayout = ();
    type RenderPipeline = ();
    type ComputePipeline = ();
    type Sampler = ();

    fn create_buffer_impl(&self, _desc: &BufferDescriptor) -> Result<RawId, DeviceError> {
        unimplemented!()
    }
    fn create_texture_impl(&self, _desc: &TextureDescriptor) -> Result<RawId, DeviceError> {
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
    fn create_shader_module_impl(&self, _module: &dyn ModuleIr) -> Result<Self::ShaderModule, DeviceError> {
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

type TestDevice = Device<NoopBackend, Dummy, Dummy, Dummy, Dummy, Dummy, Dummy, Dummy>;

/// A backend-reported `Internal` error during a compute dispatch forces
/// device loss end to end — state transitions to `Disconnected`, the lost
/// event fires with `Unknown`, pending async pipeline work is drained, and
/// further work is rejected.
#[test]
fn device_loss_cascade_from_an_internal_error() {
    let device: TestDevice = Device::new(NoopBackend, DeviceDescriptor::default(), Limits::default());
    device.initialize(Ok(())).unwrap();
    assert_eq!(device.state(), State::Alive);

    let lost_fired = Arc::new(AtomicBool::new(false));
    let waiter = device.lost_event().clone();
    let waiter_flag = lost_fired.clone();
    let wait_handle = std::thread::spawn(move || {
        let info = waiter.wait();
        waiter_flag.store(true, Ordering::SeqCst);
        info
    });

    // Spawn async pipeline work before the fault, to prove it gets drained
    // rather than left dangling.
    let pending = device.create_render_pipeline_async(|| Ok(Dummy), None);

    device.consume_error(DeviceError::Internal("compute dispatch faulted".into()), AllowedErrors::empty());

    let info = wait_handle.join().unwrap();
    assert!(lost_fired.load(Ordering::SeqCst));
    assert_eq!(info.reason, LossReason::Unknown);
    assert_eq!(device.state(), State::Disconnected);
    assert!(!device.state().accepts_work());

    // The async task manager was drained by `force_loss`; the future the
    // caller already held resolves rather than hanging forever.
    match pending.block() {
        AsyncPipelineResult::Ready(_) => {}
        AsyncPipelineResult::Lost(_) => {}
    }

    // Subsequent work is rejected: `tick` is a no-op once disconnected.
    device.tick().unwrap();
}
