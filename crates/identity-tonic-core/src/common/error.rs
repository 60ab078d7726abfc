//! Error types for the identity service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of a `UserInfo` call. It implements `From<Error>` for
//! `tonic::Status` so resolvers can propagate errors with `?` and have them
//! surface to clients with the matching status code.
//!
//! ## Error Cases
//! - `Unauthenticated`: The call carries no valid principal, or the identity
//!   provider rejected the credential.
//! - `Unavailable`: The identity provider could not be reached, failed, or did
//!   not answer before the call deadline.
//! - `Unimplemented`: No identity provider is configured.
//! - `ServiceShutdown`: A call arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for identity resolution.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// No valid principal is attached to the call.
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The upstream identity provider failed or timed out.
    #[error("Identity provider unavailable: {reason}")]
    Unavailable { reason: String },

    /// Identity resolution has not been configured.
    #[error("Identity resolution is not configured")]
    Unimplemented,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Unauthenticated { reason } => Status::unauthenticated(reason),
            Error::Unavailable { reason } => Status::unavailable(reason),
            // The default service answers with an empty message.
            Error::Unimplemented => Status::unimplemented(""),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn maps_onto_rpc_status_codes() {
        let cases = [
            (Error::unauthenticated("no principal"), Code::Unauthenticated),
            (Error::unavailable("connection refused"), Code::Unavailable),
            (Error::Unimplemented, Code::Unimplemented),
            (Error::ServiceShutdown, Code::Unavailable),
        ];

        for (err, code) in cases {
            let status = Status::from(err);
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn keeps_reason_as_status_message() {
        let status = Status::from(Error::unauthenticated("missing bearer token"));
        assert_eq!(status.message(), "missing bearer token");

        let status = Status::from(Error::Unimplemented);
        assert_eq!(status.message(), "");
    }
}
