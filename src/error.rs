//! Unified error type and the HTTP error variants handlers raise.

use thiserror::Error as ThisError;

use crate::status::Status;

/// The error type returned by trellis' fallible operations.
///
/// Two families share this enum. Startup failures (`InvalidRoute`,
/// `UnsupportedMethod`, `InvalidConfig`, `Io`) surface from
/// [`attach_controllers`](crate::attach_controllers) and
/// [`Server::serve`](crate::Server::serve) and are meant to abort the
/// process. Everything else is raised while handling a request and travels
/// through the router's error pipeline instead of unwinding.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("unsupported http method `{0}`")]
    UnsupportedMethod(String),

    #[error("invalid config `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hyper: {0}")]
    Hyper(#[from] hyper::Error),

    /// Any application error that is not an [`HttpError`]. Reported as 500.
    #[error("{0}")]
    Handler(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wraps an arbitrary application error.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Handler(err.into())
    }

    /// The HTTP status an error formatter should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Http(e) => e.status(),
            _ => Status::InternalServerError.code(),
        }
    }

    /// The [`HttpError`] carried by this error, if any.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

/// HTTP-status-carrying errors for application code.
///
/// The set is closed: an error formatter can match every variant. Use
/// [`HttpError::Custom`] for statuses without a dedicated variant.
///
/// ```rust
/// use trellis::HttpError;
///
/// let err = HttpError::conflict();
/// assert_eq!(err.status(), 409);
/// assert_eq!(err.message(), "");
///
/// let err = HttpError::Conflict("user already exists".into());
/// assert_eq!(err.message(), "user already exists");
/// ```
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnprocessableContent(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error("{message}")]
    Custom { status: u16, message: String },
}

impl HttpError {
    /// `409 Conflict` with an empty message.
    pub fn conflict() -> Self {
        Self::Conflict(String::new())
    }

    /// `500 Internal Server Error`. A message is mandatory for this variant.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalServerError(message.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_)           => Status::BadRequest.code(),
            Self::Unauthorized(_)         => Status::Unauthorized.code(),
            Self::Forbidden(_)            => Status::Forbidden.code(),
            Self::NotFound(_)             => Status::NotFound.code(),
            Self::Conflict(_)             => Status::Conflict.code(),
            Self::UnprocessableContent(_) => Status::UnprocessableContent.code(),
            Self::InternalServerError(_)  => Status::InternalServerError.code(),
            Self::Custom { status, .. }   => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::UnprocessableContent(m)
            | Self::InternalServerError(m) => m,
            Self::Custom { message, .. } => message,
        }
    }

    /// Discriminant name, stable across messages (`"Conflict"`, `"NotFound"`, …).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_)           => "BadRequest",
            Self::Unauthorized(_)         => "Unauthorized",
            Self::Forbidden(_)            => "Forbidden",
            Self::NotFound(_)             => "NotFound",
            Self::Conflict(_)             => "Conflict",
            Self::UnprocessableContent(_) => "UnprocessableContent",
            Self::InternalServerError(_)  => "InternalServerError",
            Self::Custom { .. }           => "Custom",
        }
    }
}
