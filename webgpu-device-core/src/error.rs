//! Error taxonomy.
//!
//! `DeviceError` is the taxonomy every fallible operation in this crate
//! ultimately reports through. Routing (which kinds are "allowed" per call,
//! which force device loss) lives in [`crate::device::state`], not here —
//! this module only defines the vocabulary.

use bitflags::bitflags;

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("device lost: {reason:?}: {message}")]
    DeviceLost { reason: LossReason, message: String },
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    Unknown,
    Destroyed,
    InstanceDropped,
    FailedCreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    Validation,
    OutOfMemory,
    Internal,
    DeviceLost,
    Unimplemented,
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Validation(_) => ErrorKind::Validation,
            DeviceError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            DeviceError::Internal(_) => ErrorKind::Internal,
            DeviceError::DeviceLost { .. } => ErrorKind::DeviceLost,
            DeviceError::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }
}

bitflags! {
    /// The mask of error kinds an operation allows beyond the
    /// always-allowed `VALIDATION | DEVICE_LOST`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AllowedErrors: u8 {
        const VALIDATION    = 1 << 0;
        const OUT_OF_MEMORY = 1 << 1;
        const INTERNAL      = 1 << 2;
        const DEVICE_LOST    = 1 << 3;
        const UNIMPLEMENTED  = 1 << 4;
    }
}

impl AllowedErrors {
    /// Every call's implicit floor: an operation declares an allowed-error
    /// mask in addition to this always-allowed `Validation|DeviceLost` pair.
    pub const ALWAYS: AllowedErrors = AllowedErrors::VALIDATION.union(AllowedErrors::DEVICE_LOST);

    pub fn with(additional: AllowedErrors) -> AllowedErrors {
        Self::ALWAYS.union(additional)
    }

    pub fn allows(self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::Validation => self.contains(AllowedErrors::VALIDATION),
            ErrorKind::OutOfMemory => self.contains(AllowedErrors::OUT_OF_MEMORY),
            ErrorKind::Internal => self.contains(AllowedErrors::INTERNAL),
            ErrorKind::DeviceLost => self.contains(AllowedErrors::DEVICE_LOST),
            ErrorKind::Unimplemented => self.contains(AllowedErrors::UNIMPLEMENTED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_mask_allows_validation_and_device_lost_only() {
        let mask = AllowedErrors::ALWAYS;
        assert!(mask.allows(ErrorKind::Validation));
        assert!(mask.allows(ErrorKind::DeviceLost));
        assert!(!mask.allows(ErrorKind::Internal));
        assert!(!mask.allows(ErrorKind::OutOfMemory));
    }

    #[test]
    fn unimplemented_is_its_own_error_kind() {
        let err = DeviceError::Unimplemented("backend path X".into());
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        // The routing layer (device::state) is what maps this onward to a
        // fatal/Internal-style escalation; see device::state::tests.
    }
}
