//! Google service-account token issuance.
//!
//! A [`CredentialIssuer`] signs an RS256 JWT assertion with the key's private
//! key and trades it at the key's `token_uri` for a bearer token, following
//! the standard OAuth2 JWT-bearer grant. When a delegation subject is
//! supplied the assertion carries it as `sub`, so the token acts on behalf of
//! that user (domain-wide delegation).
//!
//! Tokens are never cached: every call performs a fresh exchange.
//!
//! ```rust,no_run
//! use automation_shared::google::{CredentialIssuer, Principal, ScopeSet, ServiceAccountKey};
//!
//! # async fn run(json: &str) -> Result<(), automation_shared::errors::AuthError> {
//! let key = ServiceAccountKey::from_json(json)?;
//! let scopes = ScopeSet::new(["https://www.googleapis.com/auth/admin.directory.user.readonly"])?;
//! let issuer = CredentialIssuer::new(key, scopes);
//!
//! let admin = Principal::new("admin@example.com")?;
//! let token = issuer.issue_token(Some(&admin)).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::errors::AuthError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the signed assertion. Google caps this at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// ── Service account key ───────────────────────────────────────

/// Service-account credential material, as found in the JSON key file.
///
/// `Debug` never prints the private key, and the key material is wiped from
/// memory when the value is dropped.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidKey(format!("not a service account JSON: {}", e)))?;
        key.validate()?;
        Ok(key)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, AuthError> {
        let key: Self = serde_json::from_value(value)
            .map_err(|e| AuthError::InvalidKey(format!("not a service account JSON: {}", e)))?;
        key.validate()?;
        Ok(key)
    }

    /// Point the key at a different token endpoint (tests, private endpoints).
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// The key as a key-file document, for SDK clients that load credentials
    /// on their own.
    pub fn to_key_file(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.key_type.as_deref().unwrap_or("service_account"),
            "project_id": self.project_id,
            "private_key_id": self.private_key_id,
            "private_key": self.private_key,
            "client_email": self.client_email,
            "client_id": self.client_id,
            "token_uri": self.token_uri,
        })
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.client_email.trim().is_empty() {
            return Err(AuthError::InvalidKey("missing client_email".to_string()));
        }
        if self.private_key.trim().is_empty() {
            return Err(AuthError::InvalidKey("missing private_key".to_string()));
        }
        if self.token_uri.trim().is_empty() {
            return Err(AuthError::InvalidKey("missing token_uri".to_string()));
        }
        Ok(())
    }

    fn encoding_key(&self) -> Result<EncodingKey, AuthError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(format!("private_key is not a valid RSA PEM: {}", e)))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl Drop for ServiceAccountKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Where a service account key comes from: inline JSON or a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    JsonContent(String),
    FilePath(String),
}

impl CredentialSource {
    /// Input starting with `{` is JSON content, anything else is a path.
    pub fn from_setting(value: &str) -> Self {
        if value.trim_start().starts_with('{') {
            CredentialSource::JsonContent(value.to_string())
        } else {
            CredentialSource::FilePath(value.to_string())
        }
    }

    pub fn load(&self) -> Result<ServiceAccountKey, AuthError> {
        match self {
            CredentialSource::JsonContent(json) => ServiceAccountKey::from_json(json),
            CredentialSource::FilePath(path) => {
                let content = std::fs::read_to_string(Path::new(path)).map_err(|e| {
                    AuthError::InvalidKey(format!("cannot read credential file {}: {}", path, e))
                })?;
                ServiceAccountKey::from_json(&content)
            }
        }
    }
}

// ── Scopes / principals / tokens ──────────────────────────────

/// Ordered, non-empty list of OAuth2 scope URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new<I, S>(scopes: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if scopes.is_empty() {
            return Err(AuthError::EmptyScopes);
        }
        Ok(Self(scopes))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Space-delimited form used in the `scope` claim.
    pub fn to_claim(&self) -> String {
        self.0.join(" ")
    }
}

/// Delegation subject: the user a service account impersonates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(String);

impl Principal {
    pub fn new(email: impl Into<String>) -> Result<Self, AuthError> {
        let email = email.into();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(AuthError::InvalidPrincipal(email));
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Principal {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Principal::new(s)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short-lived bearer token. Expiry is owned by the provider; `expires_in`
/// is whatever the token endpoint reported and is never acted on here.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    token_type: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            token_type: "Bearer".to_string(),
            expires_in: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of bearer tokens for Google APIs.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, AuthError>;
}

// ── Issuer ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Issues bearer tokens for one service account and one scope set.
pub struct CredentialIssuer {
    client: reqwest::Client,
    key: ServiceAccountKey,
    scopes: ScopeSet,
    subject: Option<Principal>,
}

impl CredentialIssuer {
    pub fn new(key: ServiceAccountKey, scopes: ScopeSet) -> Self {
        Self {
            client: reqwest::Client::new(),
            key,
            scopes,
            subject: None,
        }
    }

    /// Default delegation subject used when issuing through [`TokenProvider`].
    pub fn with_subject(mut self, subject: Principal) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Build the signed JWT assertion for the token exchange.
    pub fn assertion(&self, impersonate: Option<&Principal>) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.to_claim(),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            sub: impersonate.map(Principal::as_str),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = self.key.encoding_key()?;
        Ok(jsonwebtoken::encode(&header, &claims, &encoding_key)?)
    }

    /// Exchange a fresh assertion for a bearer token.
    pub async fn issue_token(
        &self,
        impersonate: Option<&Principal>,
    ) -> Result<AccessToken, AuthError> {
        let assertion = self.assertion(impersonate)?;

        debug!(
            client_email = %self.key.client_email,
            subject = impersonate.map(Principal::as_str).unwrap_or("-"),
            scopes = %self.scopes.to_claim(),
            "requesting service account token"
        );

        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let (error, description) = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => ("unknown_error".to_string(), body),
            };
            warn!(
                client_email = %self.key.client_email,
                status = %status,
                error = %error,
                "token endpoint rejected assertion"
            );
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "response has no access_token".to_string(),
            ));
        }

        Ok(AccessToken {
            secret: token.access_token,
            token_type: token.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: token.expires_in.map(Duration::from_secs),
        })
    }
}

impl fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("client_email", &self.key.client_email)
            .field("scopes", &self.scopes)
            .field("subject", &self.subject)
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for CredentialIssuer {
    async fn access_token(&self) -> Result<AccessToken, AuthError> {
        self.issue_token(self.subject.as_ref()).await
    }
}

/// One-shot issuance: build an issuer, exchange once, drop it.
pub async fn issue_token_for(
    key: ServiceAccountKey,
    scopes: ScopeSet,
    impersonate: Option<&Principal>,
) -> Result<AccessToken, AuthError> {
    CredentialIssuer::new(key, scopes).issue_token(impersonate).await
}
