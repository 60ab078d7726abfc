//! Transport-level authentication.
//!
//! The [`interceptor::AuthInterceptor`] runs before the service handler and
//! turns call credentials into an `IdentityContext` request extension. In
//! `jwt` mode it validates tokens with [`jwt::JwtValidator`]; every other mode
//! leaves validation to the identity provider.

pub mod interceptor;
pub mod jwt;

use crate::server::config::{ProviderConfig, ServerConfig};
use interceptor::AuthInterceptor;
use jwt::JwtValidator;

/// Builds the interceptor matching the configured provider.
pub fn build_interceptor(config: &ServerConfig) -> anyhow::Result<AuthInterceptor> {
    match &config.provider {
        ProviderConfig::Jwt(jwt) => Ok(AuthInterceptor::with_validator(JwtValidator::new(jwt)?)),
        ProviderConfig::Unimplemented | ProviderConfig::Userinfo { .. } => {
            Ok(AuthInterceptor::passthrough())
        }
    }
}
