use core::time::Duration;
use identity_tonic_core::{
    ClaimMapping, ClaimSet, Error, IdentityContext, IdentityResolver, Result, UserInfoRecord,
};
use reqwest::{Client, StatusCode, Url, header::ACCEPT};
use serde_json::Value;

/// Resolves bearer tokens against an external OIDC userinfo endpoint.
///
/// The provider validates the token; a `401`/`403` answer means the caller has
/// no valid principal. Connection failures, timeouts, other non-success
/// statuses and undecodable bodies are reported as unavailability. Nothing is
/// retried.
#[derive(Debug, Clone)]
pub struct UserinfoResolver {
    client: Client,
    endpoint: Url,
    mapping: ClaimMapping,
}

impl UserinfoResolver {
    pub fn new(endpoint: Url, mapping: ClaimMapping, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            mapping,
        })
    }

    async fn fetch_claims(&self, token: &str) -> Result<ClaimSet> {
        let resp = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("userinfo request failed: {e}")))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::unauthenticated(
                    "identity provider rejected the credential",
                ));
            }
            status if !status.is_success() => {
                return Err(Error::unavailable(format!(
                    "identity provider answered {status}"
                )));
            }
            _ => {}
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::unavailable(format!("undecodable userinfo response: {e}")))?;

        ClaimSet::from_value(body)
            .ok_or_else(|| Error::unavailable("userinfo response is not a JSON object"))
    }
}

#[tonic::async_trait]
impl IdentityResolver for UserinfoResolver {
    async fn resolve(&self, context: &IdentityContext) -> Result<UserInfoRecord> {
        match context {
            IdentityContext::Bearer(token) => {
                let claims = self.fetch_claims(token).await?;
                self.mapping.map(&claims)
            }
            IdentityContext::Claims(claims) => self.mapping.map(claims),
            IdentityContext::Anonymous => Err(Error::unauthenticated("no credential presented")),
        }
    }
}
