//! Shared protocol bindings, identity types and errors.
//!
//! - [`proto`] - Generated `IdentityService` client, server trait and messages.
//! - [`types`] - [`IdentityContext`], [`ClaimSet`] and [`UserInfoRecord`].
//! - [`claims`] - Normalization of raw claims into a [`UserInfoRecord`].
//! - [`resolver`] - The [`IdentityResolver`] seam implemented by providers.
//! - [`error`] - Unified [`Error`] and its mapping onto `tonic::Status`.

pub mod claims;
pub mod error;
pub mod resolver;
pub mod types;

pub use claims::ClaimMapping;
pub use error::{Error, Result};
pub use resolver::{IdentityResolver, UnimplementedResolver};
pub use types::{ClaimSet, IdentityContext, UserInfoRecord};

/// gRPC service and message definitions generated from
/// `proto/identity.proto`.
///
/// ## Service
///
/// - `IdentityService.UserInfo` - Returns the user info of the principal
///   attached to the call credentials.
///
/// ## Messages
///
/// - [`UserInfoRequest`](proto::UserInfoRequest) - Empty; the caller is
///   identified by its credentials.
/// - [`UserInfoResponse`](proto::UserInfoResponse) - Subject, optional profile
///   fields and group memberships.
pub mod proto {
    tonic::include_proto!("identity");

    /// Encoded file descriptor set, registered with the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("identity_descriptor");
}
