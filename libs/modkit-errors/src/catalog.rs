//! Error class catalog.
//!
//! Each class pairs an HTTP status with a stable machine key. The keys are what
//! clients match on; titles are for humans.

use crate::problem::Problem;
use http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Gone,
    UnprocessableEntity,
    Server,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

impl ErrorClass {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Gone => StatusCode::GONE,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Server => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Stable machine-readable key, e.g. `_conflict`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::BadRequest => "_badRequest",
            Self::Unauthorized => "_unauthorized",
            Self::Forbidden => "_forbidden",
            Self::NotFound => "_notFound",
            Self::Conflict => "_conflict",
            Self::Gone => "_gone",
            Self::UnprocessableEntity => "_unprocessableEntity",
            Self::Server => "_serverError",
            Self::BadGateway => "_badGateway",
            Self::ServiceUnavailable => "_serviceUnavailable",
            Self::GatewayTimeout => "_gatewayTimeout",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        self.status().canonical_reason().unwrap_or("Error")
    }

    /// Whether the message attached to this class may be shown to end users as is.
    #[must_use]
    pub fn is_user_error(self) -> bool {
        self.status().is_client_error()
    }

    /// Build a problem of this class with the given detail.
    pub fn as_problem(self, detail: impl Into<String>) -> Problem {
        Problem::new(self.status(), self.title(), detail).with_code(self.key())
    }
}
