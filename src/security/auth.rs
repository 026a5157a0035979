//! Bearer token authentication and ability-based authorization.
//!
//! The guard only orchestrates: it pulls the token out of the
//! `Authorization` header, hands it to a [`TokenVerifier`], and checks the
//! decoded abilities against what a route requires. Token issuance and
//! storage live elsewhere.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::schema::TokenConfig;
use crate::time::Clock;

/// Abilities granted to a principal.
///
/// Matching is exact, `*` for everything, or `scope:*` for every ability in
/// a scope (`lgpd:*` allows `lgpd:write`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbilitySet(BTreeSet<String>);

impl AbilitySet {
    pub fn new<I, S>(abilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(abilities.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, required: &str) -> bool {
        if self.0.contains("*") || self.0.contains(required) {
            return true;
        }
        self.0.iter().any(|granted| {
            granted
                .strip_suffix(":*")
                .is_some_and(|scope| required.strip_prefix(scope).is_some_and(|rest| rest.starts_with(':')))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub abilities: AbilitySet,
}

/// What a verifier extracts from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub principal_id: String,
    pub abilities: AbilitySet,
    pub expires_at: Option<i64>,
}

/// Failures reported by a token verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token not recognised")]
    Unknown,
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
}

/// Authentication failures surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Token has expired")]
    Expired,
    #[error("Malformed token")]
    Malformed,
}

impl From<TokenError> for AuthFailure {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Unknown => AuthFailure::Unauthenticated,
            TokenError::Expired => AuthFailure::Expired,
            TokenError::Malformed => AuthFailure::Malformed,
        }
    }
}

/// Principal lacks the ability a route requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required ability: {ability}")]
pub struct Forbidden {
    pub ability: String,
}

/// External token-verification collaborator.
pub trait TokenVerifier: Send + Sync + Debug {
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// Orchestrates bearer extraction, verification and ability checks.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthGuard {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Authenticate from the raw `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthFailure> {
        let token = bearer_token(authorization).ok_or(AuthFailure::Unauthenticated)?;
        if token.is_empty() {
            return Err(AuthFailure::Malformed);
        }

        let claims = self.verifier.verify(token)?;
        Ok(Principal {
            id: claims.principal_id,
            abilities: claims.abilities,
        })
    }

    pub fn authorize(&self, principal: &Principal, required: &str) -> Result<(), Forbidden> {
        if principal.abilities.allows(required) {
            Ok(())
        } else {
            Err(Forbidden {
                ability: required.to_string(),
            })
        }
    }
}

/// Extract the token from `Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?.trim();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Verifier over a fixed list of `<id>|<secret>` tokens.
///
/// Only SHA-256 digests of the secrets are configured.
#[derive(Debug)]
pub struct StaticTokenVerifier {
    tokens: Vec<TokenConfig>,
    clock: Arc<dyn Clock>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: Vec<TokenConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { tokens, clock }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let (id, secret) = token.split_once('|').ok_or(TokenError::Malformed)?;
        let id: u64 = id.parse().map_err(|_| TokenError::Malformed)?;
        if secret.is_empty() {
            return Err(TokenError::Malformed);
        }

        let entry = self.tokens.iter().find(|t| t.id == id).ok_or(TokenError::Unknown)?;
        let digest = hex::encode(Sha256::digest(secret.as_bytes()));
        let matches: bool = digest
            .as_bytes()
            .ct_eq(entry.token_sha256.to_ascii_lowercase().as_bytes())
            .into();
        if !matches {
            return Err(TokenError::Unknown);
        }

        if entry.expires_at.is_some_and(|exp| exp <= self.clock.now()) {
            return Err(TokenError::Expired);
        }

        Ok(TokenClaims {
            principal_id: entry.principal.clone(),
            abilities: AbilitySet::new(entry.abilities.iter().cloned()),
            expires_at: entry.expires_at,
        })
    }
}

/// SHA-256 hex digest of a token secret, as stored in configuration.
pub fn hash_token_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn guard(clock: &ManualClock) -> AuthGuard {
        let tokens = vec![
            TokenConfig {
                id: 1,
                principal: "user-42".into(),
                token_sha256: hash_token_secret("s3cret"),
                abilities: vec!["conversations:read".into(), "lgpd:read".into()],
                expires_at: None,
            },
            TokenConfig {
                id: 2,
                principal: "user-43".into(),
                token_sha256: hash_token_secret("short-lived"),
                abilities: vec!["*".into()],
                expires_at: Some(2_000),
            },
        ];
        AuthGuard::new(Arc::new(StaticTokenVerifier::new(tokens, Arc::new(clock.clone()))))
    }

    #[test]
    fn test_valid_token_yields_principal() {
        let clock = ManualClock::new(1_000);
        let principal = guard(&clock).authenticate(Some("Bearer 1|s3cret")).unwrap();
        assert_eq!(principal.id, "user-42");
        assert!(principal.abilities.allows("lgpd:read"));
        assert!(!principal.abilities.allows("lgpd:write"));
    }

    #[test]
    fn test_failure_mapping() {
        let clock = ManualClock::new(1_000);
        let guard = guard(&clock);

        assert_eq!(guard.authenticate(None), Err(AuthFailure::Unauthenticated));
        assert_eq!(guard.authenticate(Some("Basic abc")), Err(AuthFailure::Unauthenticated));
        assert_eq!(guard.authenticate(Some("Bearer ")), Err(AuthFailure::Malformed));
        assert_eq!(guard.authenticate(Some("Bearer no-pipe")), Err(AuthFailure::Malformed));
        assert_eq!(guard.authenticate(Some("bearer 1|wrong")), Err(AuthFailure::Unauthenticated));
        assert_eq!(guard.authenticate(Some("Bearer 99|s3cret")), Err(AuthFailure::Unauthenticated));

        clock.set(2_000);
        assert_eq!(guard.authenticate(Some("Bearer 2|short-lived")), Err(AuthFailure::Expired));
    }

    #[test]
    fn test_authorize_requires_ability() {
        let clock = ManualClock::new(1_000);
        let guard = guard(&clock);
        let principal = guard.authenticate(Some("Bearer 1|s3cret")).unwrap();

        assert!(guard.authorize(&principal, "conversations:read").is_ok());
        assert_eq!(
            guard.authorize(&principal, "lgpd:write"),
            Err(Forbidden { ability: "lgpd:write".into() })
        );
    }

    #[test]
    fn test_ability_wildcards() {
        let scoped = AbilitySet::new(["lgpd:*"]);
        assert!(scoped.allows("lgpd:write"));
        assert!(scoped.allows("lgpd:export"));
        assert!(!scoped.allows("lgpdx:write"));
        assert!(!scoped.allows("admin:write"));

        assert!(AbilitySet::new(["*"]).allows("admin:write"));
        assert!(!AbilitySet::default().allows("api:read"));
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("BEARER  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer")), Some(""));
        assert_eq!(bearer_token(Some("Token abc")), None);
        assert_eq!(bearer_token(None), None);
    }
}
