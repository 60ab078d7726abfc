use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use core::{fmt, time::Duration};
use identity_tonic_core::ClaimMapping;
use reqwest::Url;
use std::path::PathBuf;

/// Where the claims of a caller come from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// No provider: every `UserInfo` call answers `UNIMPLEMENTED`.
    None,
    /// Self-issued JWTs, validated locally; claims are read from the token.
    Jwt,
    /// External OIDC provider; claims are fetched from its userinfo endpoint.
    Userinfo,
}

/// Runtime configuration for the `identity-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first when present).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "identity-tonic-server",
    version,
    about = "A gRPC service resolving the identity of authenticated callers"
)]
pub struct CliArgs {
    /// Identity provider backing `UserInfo`.
    ///
    /// Environment variable: `IDENTITY_PROVIDER`
    #[arg(long, env = "IDENTITY_PROVIDER", value_enum, default_value_t = ProviderKind::None)]
    pub provider: ProviderKind,

    /// HS256 shared secret used to validate self-issued tokens.
    ///
    /// Environment variable: `JWT_SECRET`
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Path to a PEM encoded RSA public key used to validate RS256 tokens.
    ///
    /// Environment variable: `JWT_PUBLIC_KEY`
    #[arg(long, env = "JWT_PUBLIC_KEY")]
    pub jwt_public_key: Option<PathBuf>,

    /// Required `iss` claim of validated tokens.
    ///
    /// Environment variable: `JWT_ISSUER`
    #[arg(long, env = "JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// Required `aud` claim of validated tokens.
    ///
    /// Environment variable: `JWT_AUDIENCE`
    #[arg(long, env = "JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    /// Clock skew tolerated when checking `exp` and `nbf`, in seconds.
    ///
    /// Environment variable: `JWT_LEEWAY_SECS`
    #[arg(long, env = "JWT_LEEWAY_SECS", default_value_t = 30)]
    pub jwt_leeway_secs: u64,

    /// Userinfo endpoint of the external identity provider.
    ///
    /// Example: `https://idp.example.com/oauth2/userinfo`
    ///
    /// Environment variable: `USERINFO_URL`
    #[arg(long, env = "USERINFO_URL")]
    pub userinfo_url: Option<String>,

    /// Claim holding the unique identifier of the principal.
    ///
    /// Environment variable: `SUBJECT_CLAIM`
    #[arg(long, env = "SUBJECT_CLAIM", default_value_t = String::from("sub"))]
    pub subject_claim: String,

    /// Claim holding the group memberships of the principal.
    ///
    /// Environment variable: `GROUPS_CLAIM`
    #[arg(long, env = "GROUPS_CLAIM", default_value_t = String::from("groups"))]
    pub groups_claim: String,

    /// Upper bound on a single identity lookup, in milliseconds. A shorter
    /// `grpc-timeout` sent by the caller takes precedence.
    ///
    /// Environment variable: `RESOLVE_TIMEOUT_MS`
    #[arg(long, env = "RESOLVE_TIMEOUT_MS", default_value_t = 5000)]
    pub resolve_timeout_ms: u64,

    /// How long a resolved identity is reused for the same bearer token, in
    /// seconds. `0` disables caching.
    ///
    /// Environment variable: `CACHE_TTL_SECS`
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 0)]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached identities.
    ///
    /// Environment variable: `CACHE_CAPACITY`
    #[arg(long, env = "CACHE_CAPACITY", default_value_t = 10_000)]
    pub cache_capacity: usize,

    /// Seconds to wait for in-flight calls to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/identity.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

/// Key material used to check token signatures.
#[derive(Clone)]
pub enum JwtAlgorithm {
    /// HMAC with SHA-256 (symmetric key)
    HS256 { secret: Vec<u8> },
    /// RSA with SHA-256 (asymmetric key)
    RS256 { public_key_pem: String },
}

impl fmt::Debug for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HS256 { .. } => f.write_str("HS256 { secret: <redacted> }"),
            Self::RS256 { .. } => f.write_str("RS256 { public_key_pem: .. }"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: JwtAlgorithm,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway: Duration,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Unimplemented,
    Jwt(JwtConfig),
    Userinfo { endpoint: Url },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub provider: ProviderConfig,
    pub claim_mapping: ClaimMapping,
    pub resolve_timeout: Duration,
    pub cache: Option<CacheConfig>,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.resolve_timeout_ms == 0 {
            bail!("RESOLVE_TIMEOUT_MS must be greater than 0");
        }

        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        if args.subject_claim.trim().is_empty() {
            bail!("SUBJECT_CLAIM must not be empty");
        }

        if args.groups_claim.trim().is_empty() {
            bail!("GROUPS_CLAIM must not be empty");
        }

        let provider = match args.provider {
            ProviderKind::None => ProviderConfig::Unimplemented,
            ProviderKind::Jwt => {
                let algorithm = match (args.jwt_secret, args.jwt_public_key) {
                    (Some(secret), None) => {
                        if secret.is_empty() {
                            bail!("JWT_SECRET must not be empty");
                        }
                        JwtAlgorithm::HS256 {
                            secret: secret.into_bytes(),
                        }
                    }
                    (None, Some(path)) => {
                        let public_key_pem = std::fs::read_to_string(&path).with_context(|| {
                            format!("failed to read JWT_PUBLIC_KEY from {}", path.display())
                        })?;
                        JwtAlgorithm::RS256 { public_key_pem }
                    }
                    (Some(_), Some(_)) => {
                        bail!("JWT_SECRET and JWT_PUBLIC_KEY are mutually exclusive")
                    }
                    (None, None) => {
                        bail!("the jwt provider requires JWT_SECRET or JWT_PUBLIC_KEY")
                    }
                };
                ProviderConfig::Jwt(JwtConfig {
                    algorithm,
                    issuer: args.jwt_issuer,
                    audience: args.jwt_audience,
                    leeway: Duration::from_secs(args.jwt_leeway_secs),
                })
            }
            ProviderKind::Userinfo => {
                let raw = args
                    .userinfo_url
                    .context("the userinfo provider requires USERINFO_URL")?;
                let endpoint = Url::parse(&raw)
                    .with_context(|| format!("USERINFO_URL ({raw}) is not a valid URL"))?;
                if !matches!(endpoint.scheme(), "http" | "https") {
                    bail!(
                        "USERINFO_URL must use http or https (got `{}`)",
                        endpoint.scheme()
                    );
                }
                ProviderConfig::Userinfo { endpoint }
            }
        };

        let cache = match args.cache_ttl_secs {
            0 => None,
            ttl => {
                if args.cache_capacity == 0 {
                    bail!("CACHE_CAPACITY must be greater than 0 when caching is enabled");
                }
                Some(CacheConfig {
                    ttl: Duration::from_secs(ttl),
                    capacity: args.cache_capacity,
                })
            }
        };

        Ok(Self {
            provider,
            claim_mapping: ClaimMapping::new(args.subject_claim, args.groups_claim),
            resolve_timeout: Duration::from_millis(args.resolve_timeout_ms),
            cache,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parses `args` with every environment fallback disabled, so ambient
    /// variables (or a `.env` file) cannot change the outcome.
    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let matches = CliArgs::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(["identity-tonic-server"].iter().chain(args).copied())?;
        ServerConfig::try_from(CliArgs::from_arg_matches(&matches)?)
    }

    #[test]
    fn defaults_to_unimplemented_provider() {
        let config = parse(&[]).unwrap();
        assert!(matches!(config.provider, ProviderConfig::Unimplemented));
        assert_eq!(config.resolve_timeout, Duration::from_secs(5));
        assert_eq!(config.cache, None);
        assert_eq!(config.claim_mapping, ClaimMapping::default());
    }

    #[test]
    fn jwt_provider_needs_exactly_one_key() {
        assert!(parse(&["--provider", "jwt"]).is_err());
        assert!(
            parse(&[
                "--provider",
                "jwt",
                "--jwt-secret",
                "s3cret",
                "--jwt-public-key",
                "/nonexistent.pem",
            ])
            .is_err()
        );

        let config = parse(&["--provider", "jwt", "--jwt-secret", "s3cret"]).unwrap();
        match config.provider {
            ProviderConfig::Jwt(jwt) => {
                assert!(matches!(jwt.algorithm, JwtAlgorithm::HS256 { .. }));
                assert_eq!(jwt.leeway, Duration::from_secs(30));
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn missing_public_key_file_is_reported() {
        let err = parse(&["--provider", "jwt", "--jwt-public-key", "/nonexistent.pem"])
            .unwrap_err();
        assert!(err.to_string().contains("JWT_PUBLIC_KEY"));
    }

    #[test]
    fn public_key_is_read_from_file() {
        let path = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/src/server/auth/testdata/rsa_public.pem"
        );
        let config = parse(&["--provider", "jwt", "--jwt-public-key", path]).unwrap();
        match config.provider {
            ProviderConfig::Jwt(jwt) => match jwt.algorithm {
                JwtAlgorithm::RS256 { public_key_pem } => {
                    assert!(public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
                }
                other => panic!("unexpected algorithm: {other:?}"),
            },
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn userinfo_provider_needs_http_url() {
        assert!(parse(&["--provider", "userinfo"]).is_err());
        assert!(parse(&["--provider", "userinfo", "--userinfo-url", "not a url"]).is_err());
        assert!(
            parse(&[
                "--provider",
                "userinfo",
                "--userinfo-url",
                "ftp://idp.example.com/userinfo",
            ])
            .is_err()
        );

        let config = parse(&[
            "--provider",
            "userinfo",
            "--userinfo-url",
            "https://idp.example.com/userinfo",
        ])
        .unwrap();
        match config.provider {
            ProviderConfig::Userinfo { endpoint } => {
                assert_eq!(endpoint.as_str(), "https://idp.example.com/userinfo");
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn cache_is_enabled_by_ttl() {
        let config = parse(&["--cache-ttl-secs", "60", "--cache-capacity", "2"]).unwrap();
        assert_eq!(
            config.cache,
            Some(CacheConfig {
                ttl: Duration::from_secs(60),
                capacity: 2,
            })
        );

        assert!(parse(&["--cache-ttl-secs", "60", "--cache-capacity", "0"]).is_err());
    }

    #[test]
    fn rejects_zero_timeout_and_empty_claims() {
        assert!(parse(&["--resolve-timeout-ms", "0"]).is_err());
        assert!(parse(&["--shutdown-timeout", "0"]).is_err());
        assert!(parse(&["--subject-claim", " "]).is_err());
        assert!(parse(&["--groups-claim", ""]).is_err());
    }

    #[test]
    fn debug_output_hides_secret() {
        let algorithm = JwtAlgorithm::HS256 {
            secret: b"s3cret".to_vec(),
        };
        assert!(!format!("{algorithm:?}").contains("s3cret"));
    }
}
