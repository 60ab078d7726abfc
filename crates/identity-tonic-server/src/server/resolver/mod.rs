//! Identity providers behind the `UserInfo` RPC.
//!
//! - [`claims::ClaimsResolver`] - Maps claims validated by the auth layer.
//! - [`userinfo::UserinfoResolver`] - Queries an external OIDC userinfo
//!   endpoint with the caller's bearer token.
//! - [`cache::CachingResolver`] - Optional TTL cache in front of a resolver.
//!
//! Without a provider the service falls back to
//! [`UnimplementedResolver`].

pub mod cache;
pub mod claims;
pub mod userinfo;

use crate::server::config::{ProviderConfig, ServerConfig};
use cache::CachingResolver;
use claims::ClaimsResolver;
use identity_tonic_core::{IdentityResolver, UnimplementedResolver};
use std::sync::Arc;
use userinfo::UserinfoResolver;

/// Builds the resolver matching the configured provider.
pub fn build_resolver(config: &ServerConfig) -> anyhow::Result<Arc<dyn IdentityResolver>> {
    let resolver: Arc<dyn IdentityResolver> = match &config.provider {
        ProviderConfig::Unimplemented => Arc::new(UnimplementedResolver),
        // Tokens are validated and mapped in-process, caching would not save
        // a round trip.
        ProviderConfig::Jwt(_) => Arc::new(ClaimsResolver::new(config.claim_mapping.clone())),
        ProviderConfig::Userinfo { endpoint } => {
            let resolver = UserinfoResolver::new(
                endpoint.clone(),
                config.claim_mapping.clone(),
                config.resolve_timeout,
            )?;
            match config.cache {
                Some(cache) => Arc::new(CachingResolver::new(resolver, cache)),
                None => Arc::new(resolver),
            }
        }
    };
    Ok(resolver)
}
