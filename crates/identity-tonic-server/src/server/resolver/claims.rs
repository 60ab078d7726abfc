use identity_tonic_core::{
    ClaimMapping, Error, IdentityContext, IdentityResolver, Result, UserInfoRecord,
};

/// Resolves principals whose claims were validated by the auth layer.
///
/// Only [`IdentityContext::Claims`] carries a principal here; raw bearer
/// tokens are never trusted without validation.
#[derive(Debug, Clone, Default)]
pub struct ClaimsResolver {
    mapping: ClaimMapping,
}

impl ClaimsResolver {
    pub fn new(mapping: ClaimMapping) -> Self {
        Self { mapping }
    }
}

#[tonic::async_trait]
impl IdentityResolver for ClaimsResolver {
    async fn resolve(&self, context: &IdentityContext) -> Result<UserInfoRecord> {
        match context {
            IdentityContext::Claims(claims) => self.mapping.map(claims),
            IdentityContext::Bearer(_) => Err(Error::unauthenticated("credential not validated")),
            IdentityContext::Anonymous => Err(Error::unauthenticated("no credential presented")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_tonic_core::ClaimSet;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_alice() {
        let resolver = ClaimsResolver::default();
        let claims = ClaimSet::from_value(json!({
            "sub": "alice@example.com",
            "groups": ["eng", "admin"],
        }))
        .unwrap();

        let record = resolver
            .resolve(&IdentityContext::Claims(claims))
            .await
            .unwrap();

        assert_eq!(record.subject(), "alice@example.com");
        assert_eq!(record.groups(), ["eng", "admin"]);
    }

    #[tokio::test]
    async fn contexts_without_principal_are_unauthenticated() {
        let resolver = ClaimsResolver::default();
        for ctx in [
            IdentityContext::Anonymous,
            IdentityContext::Bearer("unchecked".to_string()),
            IdentityContext::Claims(ClaimSet::new().with("email", "alice@example.com")),
        ] {
            assert!(matches!(
                resolver.resolve(&ctx).await,
                Err(Error::Unauthenticated { .. })
            ));
        }
    }
}
