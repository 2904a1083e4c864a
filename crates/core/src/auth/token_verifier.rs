use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::errors::Result;

/// One-way, deterministic digest of a raw session token.
///
/// Raw tokens are never persisted; sessions store this digest instead.
pub fn hash_token(raw_token: &str) -> String {
    format!("{:x}", Sha256::digest(raw_token.as_bytes()))
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Session lookup used by the verifier.
#[async_trait]
pub trait SessionRepositoryTrait: Send + Sync {
    /// Returns the owning user of a session whose digest matches and which is
    /// neither expired at `now` nor revoked.
    async fn find_active_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>>;
}

#[async_trait]
pub trait TokenVerifierTrait: Send + Sync {
    /// Resolves the user id behind an `Authorization` header value.
    ///
    /// Missing or malformed credentials, unknown sessions and expired sessions
    /// all yield `Ok(None)`. `Err` is reserved for store failures.
    async fn verify_token_from_header(&self, header_value: Option<&str>)
        -> Result<Option<String>>;
}

pub struct TokenVerifier {
    sessions: Arc<dyn SessionRepositoryTrait>,
}

impl TokenVerifier {
    pub fn new(sessions: Arc<dyn SessionRepositoryTrait>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl TokenVerifierTrait for TokenVerifier {
    async fn verify_token_from_header(
        &self,
        header_value: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(token) = header_value.and_then(parse_bearer) else {
            debug!("[Auth] Missing or malformed bearer credential");
            return Ok(None);
        };

        let user_id = self
            .sessions
            .find_active_session_user(&hash_token(token), Utc::now())
            .await?;
        if user_id.is_none() {
            debug!("[Auth] No active session for presented token");
        }
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedSessions {
        by_hash: HashMap<String, (String, DateTime<Utc>)>,
    }

    #[async_trait]
    impl SessionRepositoryTrait for FixedSessions {
        async fn find_active_session_user(
            &self,
            token_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<String>> {
            Ok(self
                .by_hash
                .get(token_hash)
                .filter(|(_, expires_at)| *expires_at > now)
                .map(|(user, _)| user.clone()))
        }
    }

    fn verifier() -> TokenVerifier {
        let mut by_hash = HashMap::new();
        by_hash.insert(
            hash_token("good-token"),
            ("user-1".to_string(), Utc::now() + chrono::Duration::hours(1)),
        );
        by_hash.insert(
            hash_token("old-token"),
            ("user-2".to_string(), Utc::now() - chrono::Duration::hours(1)),
        );
        TokenVerifier::new(Arc::new(FixedSessions { by_hash }))
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let first = hash_token("abc");
        assert_eq!(first, hash_token("abc"));
        assert_eq!(first.len(), 64);
        assert_eq!(
            first,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn bearer_parsing_is_strict_about_shape() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("abc"), None);
    }

    #[tokio::test]
    async fn valid_session_resolves_user() {
        let user = verifier()
            .verify_token_from_header(Some("Bearer good-token"))
            .await
            .unwrap();
        assert_eq!(user.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn expired_unknown_and_missing_are_unauthenticated() {
        let verifier = verifier();
        for header in [Some("Bearer old-token"), Some("Bearer nope"), Some("junk"), None] {
            assert_eq!(
                verifier.verify_token_from_header(header).await.unwrap(),
                None
            );
        }
    }
}
