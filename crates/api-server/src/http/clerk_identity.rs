use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use super::clerk_jwks_cache::{ClerkJwksCache, ClerkJwksCacheError};

const CLOCK_SKEW_SECONDS: u64 = 60;
const REQUIRED_CLAIMS: [&str; 5] = ["exp", "iat", "iss", "aud", "sub"];

/// Verifies Clerk session JWTs for one issuer and audience.
#[derive(Clone)]
pub struct ClerkVerifier {
    http_client: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audience: String,
    jwks_cache: ClerkJwksCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ClerkSession {
    pub(super) subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenRejection {
    Malformed,
    UnsupportedAlgorithm,
    MissingKeyId,
    UnknownKey,
    UnusableKey,
    Expired,
    WrongAudience,
    WrongIssuer,
    IssuedInFuture,
    MissingSubject,
    Invalid,
}

impl TokenRejection {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::MissingKeyId => "missing_key_id",
            Self::UnknownKey => "unknown_key",
            Self::UnusableKey => "unusable_key",
            Self::Expired => "expired",
            Self::WrongAudience => "wrong_audience",
            Self::WrongIssuer => "wrong_issuer",
            Self::IssuedInFuture => "issued_in_future",
            Self::MissingSubject => "missing_subject",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ClerkIdentityError {
    Rejected(TokenRejection),
    /// The JWKS could not be loaded or parsed.
    JwksUnavailable,
}

impl From<TokenRejection> for ClerkIdentityError {
    fn from(rejection: TokenRejection) -> Self {
        Self::Rejected(rejection)
    }
}

#[derive(Debug, Deserialize)]
struct ClerkClaims {
    sub: String,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct ClerkJwks {
    keys: Vec<ClerkJwk>,
}

#[derive(Debug, Deserialize)]
struct ClerkJwk {
    kid: String,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    n: String,
    e: String,
}

impl ClerkVerifier {
    pub fn new(
        http_client: reqwest::Client,
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        jwks_cache: ClerkJwksCache,
    ) -> Self {
        Self {
            http_client,
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            jwks_cache,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(super) async fn verify(&self, token: &str) -> Result<ClerkSession, ClerkIdentityError> {
        let key_id = token_key_id(token)?;

        let jwks_json = self
            .jwks_cache
            .load_jwks_for_key(&self.http_client, &self.jwks_url, &key_id)
            .await
            .map_err(|err| match err {
                ClerkJwksCacheError::UnknownKeyId => TokenRejection::UnknownKey.into(),
                ClerkJwksCacheError::UpstreamUnavailable => ClerkIdentityError::JwksUnavailable,
            })?;
        let jwks = serde_json::from_str::<ClerkJwks>(&jwks_json)
            .map_err(|_| ClerkIdentityError::JwksUnavailable)?;

        Ok(verify_against_jwks(
            token,
            &key_id,
            &self.issuer,
            &self.audience,
            &jwks,
        )?)
    }
}

/// Reads the signing key id from an RS256 token header.
fn token_key_id(token: &str) -> Result<String, TokenRejection> {
    let header = decode_header(token).map_err(|_| TokenRejection::Malformed)?;
    if header.alg != Algorithm::RS256 {
        return Err(TokenRejection::UnsupportedAlgorithm);
    }
    header
        .kid
        .filter(|kid| !kid.trim().is_empty())
        .ok_or(TokenRejection::MissingKeyId)
}

fn signing_key(jwks: &ClerkJwks, key_id: &str) -> Result<DecodingKey, TokenRejection> {
    let jwk = jwks
        .keys
        .iter()
        .find(|key| {
            key.kid == key_id
                && key.kty == "RSA"
                && key.key_use.as_deref().is_none_or(|key_use| key_use == "sig")
        })
        .ok_or(TokenRejection::UnknownKey)?;

    if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
        return Err(TokenRejection::UnusableKey);
    }
    DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|_| TokenRejection::UnusableKey)
}

fn verify_against_jwks(
    token: &str,
    key_id: &str,
    issuer: &str,
    audience: &str,
    jwks: &ClerkJwks,
) -> Result<ClerkSession, TokenRejection> {
    let decoding_key = signing_key(jwks, key_id)?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.leeway = CLOCK_SKEW_SECONDS;
    validation.required_spec_claims = REQUIRED_CLAIMS.into_iter().map(str::to_string).collect();

    let claims = decode::<ClerkClaims>(token, &decoding_key, &validation)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::InvalidAudience => TokenRejection::WrongAudience,
            ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
            _ => TokenRejection::Invalid,
        })?
        .claims;

    if claims.iat > Utc::now().timestamp() + CLOCK_SKEW_SECONDS as i64 {
        return Err(TokenRejection::IssuedInFuture);
    }

    let subject = claims.sub.trim();
    if subject.is_empty() {
        return Err(TokenRejection::MissingSubject);
    }

    Ok(ClerkSession {
        subject: subject.to_string(),
    })
}
