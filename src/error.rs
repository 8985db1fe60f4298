use crate::domain::registration::RegistrationError;
use crate::domain::staff_invitation::StaffInvitationError;
use crate::domain::student::StudentError;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Infrastructure outcomes (NotFound, Conflict, Internal) live next to the
// per-aggregate business errors so a repository call has a single error type.
// Every variant exposes a stable machine-readable code for the boundary layer.
//
// ============================================================================

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{entity} already exists")]
    Conflict { entity: &'static str },

    #[error("stream {stream} has not been initialized")]
    StreamNotInitialized { stream: String },

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    StaffInvitation(#[from] StaffInvitationError),

    #[error(transparent)]
    Student(#[from] StudentError),
}

impl Error {
    pub fn not_found(entity: &'static str) -> Self {
        Error::NotFound { entity }
    }

    pub fn conflict(entity: &'static str) -> Self {
        Error::Conflict { entity }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Error::Internal(err.into())
    }

    /// Stable, locale independent code used by the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::StreamNotInitialized { .. } => "stream_not_initialized",
            Error::Internal(_) => "internal",
            Error::Registration(e) => e.code(),
            Error::StaffInvitation(e) => e.code(),
            Error::Student(e) => e.code(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Internal(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.into())
    }
}
