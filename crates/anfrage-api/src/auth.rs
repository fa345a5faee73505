//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use anfrage_storage::repository::{ApiKey, ApiKeyRepository};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Header carrying the shared secret for scheduled triggers
pub const CRON_TOKEN_HEADER: &str = "x-cron-token";

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Scopes granted to this API key
    pub scopes: Vec<String>,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

impl AuthContext {
    /// Check if the authenticated context has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    api_key.get(..8)
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored hash.
///
/// Supports both Argon2 hashes (`$argon2...`) and legacy SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Compare a presented token with the configured one.
///
/// Both sides are hashed first so the comparison always covers 32 bytes and
/// takes the same time wherever the first mismatch sits.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Validate an API key against the key store
async fn validate_api_key(
    repo: &Arc<dyn ApiKeyRepository>,
    api_key: &str,
) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    // Find potential matches by prefix
    let candidates = repo.find_by_prefix(prefix).await.map_err(|e| {
        error!(error = %e, "Failed to look up API key");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if candidates.is_empty() {
        warn!(prefix, "No API key found with prefix");
        return Err(StatusCode::UNAUTHORIZED);
    }

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if candidate.is_expired() {
                warn!(api_key_id = %candidate.id, "API key has expired");
                return Err(StatusCode::UNAUTHORIZED);
            }

            // Fire and forget; a failed timestamp update does not fail auth
            let repo = repo.clone();
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = repo.update_last_used(key_id).await {
                    error!(error = %e, "Failed to update API key last_used_at");
                }
            });

            debug!(api_key_id = %candidate.id, "API key authenticated");
            return Ok(candidate);
        }
    }

    warn!(prefix, "API key hash mismatch");
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware for staff endpoints
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "Missing API key");
        StatusCode::UNAUTHORIZED
    })?;

    let validated_key = validate_api_key(&state.repos.api_keys, api_key).await?;

    let auth_context = AuthContext {
        scopes: validated_key.scopes_vec(),
        api_key_id: validated_key.id,
    };
    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

/// Check if the authenticated key has a specific scope
pub fn require_scope(auth_context: &AuthContext, scope: &str) -> Result<(), StatusCode> {
    if !auth_context.has_scope(scope) {
        warn!(
            api_key_id = %auth_context.api_key_id,
            scope,
            "Scope access denied"
        );
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

/// Guard for the scheduled trigger endpoints.
///
/// The caller's address must fall inside one of the configured networks and,
/// when a token is configured, `X-Cron-Token` must match it.
pub async fn cron_guard(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ConnectInfo(peer)) = connect_info else {
        warn!(path = %request.uri().path(), "Cron request without peer address");
        return Err(StatusCode::FORBIDDEN);
    };

    let ip = peer.ip();
    if !state.cron_networks.iter().any(|net| net.contains(&ip)) {
        warn!(peer = %ip, path = %request.uri().path(), "Cron request from disallowed network");
        return Err(StatusCode::FORBIDDEN);
    }

    if let Some(expected) = &state.cron_token {
        let provided = request
            .headers()
            .get(CRON_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if !provided.is_some_and(|token| tokens_match(token, expected)) {
            warn!(peer = %ip, "Cron request with missing or wrong token");
            return Err(StatusCode::FORBIDDEN);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;

    #[test]
    fn verifies_legacy_sha256_hash() {
        let api_key = "ak_test_legacy_key";
        let legacy_hash = hash_api_key(api_key);

        assert!(verify_api_key(api_key, &legacy_hash));
        assert!(!verify_api_key("wrong_key", &legacy_hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "ak_test_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(api_key.as_bytes(), &salt)
            .expect("argon2 hash generation should succeed")
            .to_string();

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn prefix_needs_eight_characters() {
        assert_eq!(extract_key_prefix("ak_12345xyz"), Some("ak_12345"));
        assert_eq!(extract_key_prefix("short"), None);
    }

    #[test]
    fn cron_tokens_compare_by_digest() {
        assert!(tokens_match("s3cret-token", "s3cret-token"));
        assert!(!tokens_match("s3cret-tokeN", "s3cret-token"));
        assert!(!tokens_match("s3cret", "s3cret-token"));
        assert!(!tokens_match("", "s3cret-token"));
    }

    #[test]
    fn wildcard_scope_grants_everything() {
        let ctx = AuthContext {
            scopes: vec!["*".to_string()],
            api_key_id: Uuid::new_v4(),
        };
        assert!(require_scope(&ctx, "settings").is_ok());

        let limited = AuthContext {
            scopes: vec!["tickets".to_string()],
            ..ctx
        };
        assert!(limited.has_scope("tickets"));
        assert_eq!(require_scope(&limited, "settings"), Err(StatusCode::FORBIDDEN));
    }
}
