//! The identity resolution seam.
//!
//! An [`IdentityResolver`] turns the [`IdentityContext`] of one call into a
//! [`UserInfoRecord`]. Implementations extract and normalize claims; they do
//! not authenticate, retry, or keep per-call state. Callers own the deadline.

use crate::{
    error::{Error, Result},
    types::{IdentityContext, UserInfoRecord},
};
use std::sync::Arc;

/// Resolves the principal of a call into normalized user info.
#[tonic::async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// Resolves `context` into a record whose subject identifies the
    /// principal.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthenticated`] if the context carries no valid principal.
    /// - [`Error::Unavailable`] if the identity provider cannot be reached.
    /// - [`Error::Unimplemented`] if no provider is configured.
    async fn resolve(&self, context: &IdentityContext) -> Result<UserInfoRecord>;
}

#[tonic::async_trait]
impl<R> IdentityResolver for Arc<R>
where
    R: IdentityResolver + ?Sized,
{
    async fn resolve(&self, context: &IdentityContext) -> Result<UserInfoRecord> {
        (**self).resolve(context).await
    }
}

/// Resolver used until a real identity provider is wired in. Every call fails
/// with [`Error::Unimplemented`], whatever the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedResolver;

#[tonic::async_trait]
impl IdentityResolver for UnimplementedResolver {
    async fn resolve(&self, _context: &IdentityContext) -> Result<UserInfoRecord> {
        Err(Error::Unimplemented)
    }
}
