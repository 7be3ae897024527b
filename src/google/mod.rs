pub mod auth;

pub use auth::{
    issue_token_for, AccessToken, CredentialIssuer, CredentialSource, Principal, ScopeSet,
    ServiceAccountKey, TokenProvider, DEFAULT_TOKEN_URI,
};
