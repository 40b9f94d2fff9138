//! Error-scope stack: a LIFO stack where `push(filter)` opens a scope and
//! `pop()` returns the first error matching that filter seen since the
//! matching `push`.

use crate::error::{AllowedErrors, DeviceError, ErrorKind};

#[derive(Debug, Default)]
pub struct ErrorScope {
    filter: AllowedErrors,
    captured: Option<DeviceError>,
}

#[derive(Debug, thiserror::Error)]
pub enum PopError {
    #[error("no error scope is open")]
    EmptyStack,
}

/// LIFO stack of [`ErrorScope`]s, owned by one device.
#[derive(Default)]
pub struct ErrorScopeStack {
    scopes: Vec<ErrorScope>,
}

impl ErrorScopeStack {
    pub fn push(&mut self, filter: AllowedErrors) {
        self.scopes.push(ErrorScope { filter, captured: None });
    }

    pub fn pop(&mut self) -> Result<Option<DeviceError>, PopError> {
        let scope = self.scopes.pop().ok_or(PopError::EmptyStack)?;
        Ok(scope.captured)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Offers `error` to every open scope, innermost first. The first scope
    /// whose filter matches the error's kind consumes it and stops
    /// propagation; scopes above that point see nothing for this
    /// occurrence.
    ///
    /// Returns `true` if some scope consumed the error, `false` if it must
    /// fall through to the uncaptured-error callback.
    pub fn offer(&mut self, error: DeviceError) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if scope.captured.is_none() && scope.filter.allows(error.kind()) {
                scope.captured = Some(error);
                return true;
            }
        }
        false
    }

    pub fn matches_kind(filter: AllowedErrors, kind: ErrorKind) -> bool {
        filter.allows(kind)
    }
}
