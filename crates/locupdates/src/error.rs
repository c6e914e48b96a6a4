/// Errors raised by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Location authorization was revoked or never granted.
    #[error("location permission denied: {0}")]
    Permission(String),

    /// A caller broke the attach/detach contract.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

/// Errors returned by a [`LocationProvider`](crate::provider::LocationProvider).
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ProviderError {
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("provider unavailable: {message}")]
    Unavailable { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for ProviderError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Unavailable { message: e.reason }
    }
}

impl From<ProviderError> for ControlError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::PermissionDenied { message } => Self::Permission(message),
            // treated like a permission failure so state is rolled back the same way
            ProviderError::Unavailable { message } => Self::Permission(message),
        }
    }
}

/// Errors returned by the indicator surface and process host.
///
/// These are logged and never change reporting state.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum HostError {
    #[error("host operation failed: {message}")]
    Failed { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for HostError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Failed { message: e.reason }
    }
}

/// Kind of a [`CoreError`], so foreign callers can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum CoreErrorKind {
    Permission,
    Precondition,
    Other,
}

/// Error type for FFI.
#[derive(Debug, thiserror::Error, uniffi::Object)]
#[error("{e:?}")]
pub struct CoreError {
    e: anyhow::Error,
}

#[uniffi::export]
impl CoreError {
    fn message(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> CoreErrorKind {
        match self.e.downcast_ref::<ControlError>() {
            Some(ControlError::Permission(_)) => CoreErrorKind::Permission,
            Some(ControlError::Precondition(_)) => CoreErrorKind::Precondition,
            None => CoreErrorKind::Other,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        Self { e }
    }
}

impl From<ControlError> for CoreError {
    fn from(e: ControlError) -> Self {
        Self { e: e.into() }
    }
}

/// Creates a CoreError by wrapping anyhow::anyhow!.
macro_rules! core_error {
    ($msg:literal $(,)?) => {
        CoreError::from(anyhow::anyhow!($msg))
    };
    ($err:expr $(,)?) => {
        CoreError::from(anyhow::anyhow!($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        CoreError::from(anyhow::anyhow!($fmt, $($arg)*))
    };
}
pub(crate) use core_error;
