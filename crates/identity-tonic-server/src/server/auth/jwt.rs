use crate::server::config::{JwtAlgorithm, JwtConfig};
use anyhow::Context;
use identity_tonic_core::{ClaimSet, Error};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};

/// Validates self-issued bearer tokens and extracts their claims.
///
/// Signature, `exp` and `nbf` are always checked. Issuer and audience are
/// checked only when configured.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> anyhow::Result<Self> {
        let (decoding_key, algorithm) = match &config.algorithm {
            JwtAlgorithm::HS256 { secret } => (DecodingKey::from_secret(secret), Algorithm::HS256),
            JwtAlgorithm::RS256 { public_key_pem } => (
                DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                    .context("invalid RSA public key")?,
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = config.leeway.as_secs();

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Validates `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] for any token that does not pass
    /// validation.
    pub fn validate(&self, token: &str) -> Result<ClaimSet, Error> {
        decode::<ClaimSet>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::unauthenticated("token expired"),
                ErrorKind::ImmatureSignature => Error::unauthenticated("token not yet valid"),
                ErrorKind::InvalidIssuer => Error::unauthenticated("token issuer not accepted"),
                ErrorKind::InvalidAudience => {
                    Error::unauthenticated("token audience not accepted")
                }
                _ => Error::unauthenticated(format!("invalid token: {e}")),
            })
    }
}
