use super::jwt::JwtValidator;
use identity_tonic_core::IdentityContext;
use std::sync::Arc;
use tonic::{Request, Status, metadata::MetadataMap, service::Interceptor};

const AUTHORIZATION: &str = "authorization";
const BEARER: &str = "bearer";

/// Attaches an [`IdentityContext`] to every inbound call.
///
/// Without a validator the interceptor never rejects: missing or malformed
/// credentials become [`IdentityContext::Anonymous`] and bearer tokens are
/// passed on untouched for the resolver to introspect. With a validator, a
/// presented token must validate and the call carries its claims instead.
#[derive(Clone, Default)]
pub struct AuthInterceptor {
    validator: Option<Arc<JwtValidator>>,
}

impl AuthInterceptor {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn with_validator(validator: JwtValidator) -> Self {
        Self {
            validator: Some(Arc::new(validator)),
        }
    }

    fn context(&self, metadata: &MetadataMap) -> Result<IdentityContext, Status> {
        let Some(token) = bearer_token(metadata) else {
            return Ok(IdentityContext::Anonymous);
        };

        match &self.validator {
            Some(validator) => {
                let claims = validator.validate(token).inspect_err(|_e| {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Rejected bearer token: {_e}");
                })?;
                Ok(IdentityContext::Claims(claims))
            }
            None => Ok(IdentityContext::Bearer(token.to_owned())),
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        let context = self.context(req.metadata())?;
        req.extensions_mut().insert(context);
        Ok(req)
    }
}

/// Extracts the token of an `authorization: Bearer <token>` header. The
/// scheme is matched case-insensitively.
fn bearer_token(metadata: &MetadataMap) -> Option<&str> {
    let value = metadata.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
