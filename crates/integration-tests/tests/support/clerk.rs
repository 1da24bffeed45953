#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::thread_rng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use serde_json::{Value, json};

use super::llm::serve;

const SIGNING_KEY_ID: &str = "jarvis-integration-key";
const ISSUER: &str = "https://clerk.example.test";
const AUDIENCE: &str = "jarvis-api";

static SIGNING_KEY: OnceLock<SigningKey> = OnceLock::new();

struct SigningKey {
    encoding_key: EncodingKey,
    jwk: Value,
}

/// A mock identity provider: one RSA key published as a JWKS document.
pub struct TestClerkAuth {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: String,
    jwks_fetches: Arc<AtomicUsize>,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for TestClerkAuth {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[derive(Debug, Serialize)]
struct SessionClaims<'a> {
    sub: &'a str,
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl TestClerkAuth {
    pub async fn start() -> Self {
        let jwks_fetches = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/.well-known/jwks.json", get(serve_jwks))
            .with_state(jwks_fetches.clone());
        let (addr, server) = serve(app).await;

        Self {
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            jwks_url: format!("http://{addr}/.well-known/jwks.json"),
            jwks_fetches,
            server,
        }
    }

    /// How many times the JWKS document has been downloaded.
    pub fn jwks_fetches(&self) -> usize {
        self.jwks_fetches.load(Ordering::SeqCst)
    }

    /// `Authorization` header value for a fresh token.
    pub fn bearer_for_subject(&self, subject: &str) -> String {
        format!("Bearer {}", self.token_for_subject(subject))
    }

    pub fn token_for_subject(&self, subject: &str) -> String {
        self.sign(subject, &self.audience, Duration::minutes(5))
    }

    pub fn expired_token_for_subject(&self, subject: &str) -> String {
        self.sign(subject, &self.audience, Duration::minutes(-5))
    }

    pub fn token_with_audience(&self, subject: &str, audience: &str) -> String {
        self.sign(subject, audience, Duration::minutes(5))
    }

    fn sign(&self, subject: &str, audience: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject,
            iss: &self.issuer,
            aud: audience,
            iat: (now - Duration::seconds(30)).timestamp(),
            exp: (now + expires_in).timestamp(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(SIGNING_KEY_ID.to_string());

        encode(&header, &claims, &signing_key().encoding_key).expect("token should encode")
    }
}

async fn serve_jwks(State(fetches): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    fetches.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CACHE_CONTROL, "public, max-age=600")],
        Json(json!({ "keys": [signing_key().jwk.clone()] })),
    )
}

fn signing_key() -> &'static SigningKey {
    SIGNING_KEY.get_or_init(|| {
        let private_key =
            RsaPrivateKey::new(&mut thread_rng(), 2048).expect("test RSA key should generate");
        let pem = private_key
            .to_pkcs8_pem(Default::default())
            .expect("test RSA key should serialize");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test RSA key should load");

        let public_key = private_key.to_public_key();
        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": SIGNING_KEY_ID,
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        SigningKey { encoding_key, jwk }
    })
}
