//! Lost-event one-shot future: signalling marks it ready exactly once; late
//! subscribers still observe the already-recorded reason and message.

use std::sync::{Arc, Mutex};

use crate::error::LossReason;

#[derive(Clone, Debug)]
pub struct LostInfo {
    pub reason: LossReason,
    pub message: String,
}

#[derive(Default)]
struct Inner {
    info: Option<LostInfo>,
    waiters: Vec<std::sync::mpsc::Sender<LostInfo>>,
}

/// Cloneable handle to a device's lost-event. Every clone observes the same
/// underlying one-shot state.
#[derive(Clone)]
pub struct LostEvent(Arc<Mutex<Inner>>);

impl Default for LostEvent {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Inner::default())))
    }
}

impl LostEvent {
    /// Marks the event ready. A second call is a no-op: WebGPU only loses a
    /// device once.
    pub fn signal(&self, reason: LossReason, message: impl Into<String>) {
        let mut inner = self.0.lock().unwrap();
        if inner.info.is_some() {
            return;
        }
        let info = LostInfo { reason, message: message.into() };
        inner.info = Some(info.clone());
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(info.clone());
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.0.lock().unwrap().info.is_some()
    }

    pub fn try_get(&self) -> Option<LostInfo> {
        self.0.lock().unwrap().info.clone()
    }

    /// Blocks the calling thread until the event fires, or returns
    /// immediately if it already has. There is no cooperative suspension in
    /// this core; callers that want async behavior wrap this on their own
    /// executor.
    pub fn wait(&self) -> LostInfo {
        let mut inner = self.0.lock().unwrap();
        if let Some(info) = &inner.info {
            return info.clone();
        }
        let (tx, rx) = std::sync::mpsc::channel();
        inner.waiters.push(tx);
        drop(inner);
        rx.recv().expect("LostEvent sender dropped without signalling")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsignalled_event_reports_nothing() {
        let event = LostEvent::default();
        assert!(!event.is_signalled());
        assert!(event.try_get().is_none());
    }

    #[test]
    fn second_signal_is_ignored() {
        let event = LostEvent::default();
        event.signal(LossReason::Unknown, "first");
        event.signal(LossReason::Destroyed, "second");
        assert_eq!(event.try_get().unwrap().message, "first");
    }

    #[test]
    fn waiting_thread_observes_a_later_signal() {
        let event = LostEvent::default();
        let waiter = event.clone();
        let handle = std::thread::spawn(move || waiter.wait());
        std::thread::sleep(std::time::Duration::from_millis(10));
        event.signal(LossReason::InstanceDropped, "gone");
        let info = handle.join().unwrap();
        assert_eq!(info.reason, LossReason::InstanceDropped);
    }
}
