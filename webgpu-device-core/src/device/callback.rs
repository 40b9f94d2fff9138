//! Async task manager and callback queue, built directly on `std::thread` +
//! channels rather than a dedicated worker-pool crate.
//!
//! Cached pipelines complete immediately; uncached ones run on a worker
//! thread and their result arrives through a channel the caller can poll or
//! block on.

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{DeviceError, LossReason};

pub enum AsyncPipelineResult<T> {
    Ready(Result<T, DeviceError>),
    Lost(LossReason),
}

/// A handle to work dispatched on the async task manager. `poll` never
/// blocks; `block` waits for the worker thread.
pub struct PipelineFuture<T> {
    rx: Receiver<AsyncPipelineResult<T>>,
    cached: Option<AsyncPipelineResult<T>>,
}

impl<T> PipelineFuture<T> {
    fn from_receiver(rx: Receiver<AsyncPipelineResult<T>>) -> Self {
        Self { rx, cached: None }
    }

    fn ready(result: AsyncPipelineResult<T>) -> Self {
        let (_tx, rx) = channel();
        Self { rx, cached: Some(result) }
    }

    pub fn poll(&mut self) -> Option<&AsyncPipelineResult<T>> {
        if self.cached.is_none() {
            if let Ok(result) = self.rx.try_recv() {
                self.cached = Some(result);
            }
        }
        self.cached.as_ref()
    }

    pub fn block(mut self) -> AsyncPipelineResult<T> {
        if let Some(cached) = self.cached.take() {
            return cached;
        }
        self.rx.recv().unwrap_or(AsyncPipelineResult::Lost(LossReason::InstanceDropped))
    }
}

/// Spawns one detached worker thread per task. Pipeline creation suspends
/// only on that worker thread, never the calling one; the calling thread
/// receives a future immediately. No pooling: the workload here is "compile
/// one pipeline," which is already coarse enough that thread-spawn overhead
/// is noise next to shader compilation.
#[derive(Default)]
pub struct AsyncTaskManager {
    outstanding: std::sync::Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl AsyncTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached pipelines complete immediately, with no worker thread involved.
    pub fn complete_immediately<T: Send + 'static>(&self, result: Result<T, DeviceError>) -> PipelineFuture<T> {
        PipelineFuture::ready(AsyncPipelineResult::Ready(result))
    }

    /// Uncached pipelines are initialized on a worker thread.
    pub fn spawn<T, F>(&self, work: F) -> PipelineFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DeviceError> + Send + 'static,
    {
        let (tx, rx): (Sender<AsyncPipelineResult<T>>, Receiver<AsyncPipelineResult<T>>) = channel();
        let handle = std::thread::spawn(move || {
            let _ = tx.send(AsyncPipelineResult::Ready(work()));
        });
        self.outstanding.lock().unwrap().push(handle);
        PipelineFuture::from_receiver(rx)
    }

    /// Destroying the device drains every outstanding task. Individual
    /// futures aren't separately cancellable, so this just joins everything.
    pub fn wait_all_pending_tasks(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        for handle in outstanding.drain(..) {
            let _ = handle.join();
        }
    }
}

/// A single queued application callback, fired outside the device lock
/// during a tick or instance event-processing pass.
pub enum QueuedCallback {
    UncapturedError(DeviceError),
    DeviceLost { reason: LossReason, message: String },
}

#[derive(Default)]
pub struct CallbackQueue {
    pending: Vec<QueuedCallback>,
}

impl CallbackQueue {
    pub fn push(&mut self, callback: QueuedCallback) {
        self.pending.push(callback);
    }

    /// Drains every queued callback. Called from `tick`/`process_events`;
    /// the caller invokes the application-provided function for each.
    pub fn drain(&mut self) -> Vec<QueuedCallback> {
        std::mem::take(&mut self.pending)
    }

    /// Shutdown fires every pending callback with a terminal status:
    /// draining the queue and appending one forced device-lost callback for
    /// whatever wasn't already one.
    pub fn handle_shutdown(&mut self, reason: LossReason) -> Vec<QueuedCallback> {
        let mut drained = self.drain();
        drained.push(QueuedCallback::DeviceLost { reason, message: "device destroyed".into() });
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_pipeline_future_is_ready_without_a_thread() {
        let manager = AsyncTaskManager::new();
        let mut future = manager.complete_immediately::<u32>(Ok(7));
        match future.poll().unwrap() {
            AsyncPipelineResult::Ready(Ok(value)) => assert_eq!(*value, 7),
            _ => panic!("expected immediate ready result"),
        }
    }

    #[test]
    fn spawned_pipeline_future_blocks_until_worker_finishes() {
        let manager = AsyncTaskManager::new();
        let future = manager.spawn(|| Ok::<_, DeviceError>(42u32));
        match future.block() {
            AsyncPipelineResult::Ready(Ok(value)) => assert_eq!(value, 42),
            _ => panic!("expected worker result"),
        }
        manager.wait_all_pending_tasks();
    }

    #[test]
    fn shutdown_appends_a_terminal_device_lost_callback() {
        let mut queue = CallbackQueue::default();
        queue.push(QueuedCallback::UncapturedError(DeviceError::Internal("x".into())));
        let drained = queue.handle_shutdown(LossReason::Destroyed);
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained.last().unwrap(), QueuedCallback::DeviceLost { .. }));
        assert!(queue.is_empty());
    }
}
