use modkit_errors::{ErrorClass, Problem, ValidationViolation};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every failure an action can report.
///
/// `Conflict`, `UnprocessableEntity`, `Forbidden` and `BadRequest` carry
/// messages that are safe to show to end users. `Server` carries an opaque
/// message; the underlying store error is logged where it is classified.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Server(String),

    #[error("{message}")]
    BadRequest {
        message: String,
        violations: Vec<ValidationViolation>,
    },

    #[error("invalid entity descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("{0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl ActionError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::UnprocessableEntity(_) => ErrorClass::UnprocessableEntity,
            Self::Forbidden(_) => ErrorClass::Forbidden,
            Self::BadRequest { .. } => ErrorClass::BadRequest,
            Self::Timeout(_) => ErrorClass::GatewayTimeout,
            Self::Server(_) | Self::InvalidDescriptor(_) | Self::Config(_) | Self::Db(_) => {
                ErrorClass::Server
            }
        }
    }

    /// Problem details for transport layers. Internal causes never leak.
    pub fn to_problem(&self) -> Problem {
        let class = self.class();
        match self {
            Self::BadRequest { message, violations } => {
                class.as_problem(message.clone()).with_errors(violations.clone())
            }
            Self::Conflict(msg)
            | Self::UnprocessableEntity(msg)
            | Self::Forbidden(msg)
            | Self::Server(msg)
            | Self::Timeout(msg) => class.as_problem(msg.clone()),
            Self::InvalidDescriptor(_) | Self::Config(_) | Self::Db(_) => {
                class.as_problem("Internal server error")
            }
        }
    }

    /// Classify a failed write: unique violations become `Conflict`, anything
    /// else is logged and replaced by an opaque `Server` error.
    pub(crate) fn from_write(
        err: DbErr,
        conflict: impl FnOnce() -> String,
        server: impl FnOnce() -> String,
    ) -> Self {
        if is_unique_violation(&err) {
            return Self::Conflict(conflict());
        }
        let message = server();
        tracing::error!(error = %err, "{message}");
        Self::Server(message)
    }
}

impl From<ActionError> for Problem {
    fn from(err: ActionError) -> Self {
        err.to_problem()
    }
}

impl From<figment::Error> for ActionError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Whether the store rejected a write for duplicating a unique key.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn user_errors_keep_their_message() {
        let p = ActionError::Conflict("Person already exists".to_owned()).to_problem();
        assert_eq!(p.status.as_u16(), 409);
        assert_eq!(p.detail, "Person already exists");

        let p = ActionError::Forbidden("nope".to_owned()).to_problem();
        assert_eq!(p.status.as_u16(), 403);
        assert_eq!(p.code, "_forbidden");
    }

    #[test]
    fn store_errors_are_opaque() {
        let err = ActionError::Db(DbErr::Custom("relation \"secret\" does not exist".to_owned()));
        let p = err.to_problem();
        assert_eq!(p.status.as_u16(), 500);
        assert_eq!(p.detail, "Internal server error");
    }

    #[test]
    fn bad_request_carries_violations() {
        let err = ActionError::BadRequest {
            message: "1 field is invalid".to_owned(),
            violations: vec![ValidationViolation::new("email", "email is required")],
        };
        let p = Problem::from(err);
        assert_eq!(p.status.as_u16(), 400);
        assert_eq!(p.errors.map(|e| e.len()), Some(1));
    }

    #[test]
    fn non_unique_write_failures_become_server_errors() {
        let err = ActionError::from_write(
            DbErr::Custom("disk full".to_owned()),
            || "Person already exists".to_owned(),
            || "Could not create person".to_owned(),
        );
        assert!(matches!(err, ActionError::Server(ref m) if m == "Could not create person"));
    }
}
