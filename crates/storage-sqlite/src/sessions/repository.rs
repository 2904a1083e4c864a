//! Session persistence backing bearer token verification.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use log::info;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

use ledgerbox_core::auth::{hash_token, SessionRepositoryTrait};
use ledgerbox_core::errors::{Error, Result};
use ledgerbox_core::utils::time_utils::format_timestamp;

use super::model::SessionDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sessions;

const TOKEN_BYTES: usize = 32;

/// A freshly issued session. `token` is only available at issue time.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct SessionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SessionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn create_session(&self, user_id: &str, ttl: Duration) -> Result<IssuedSession> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("userId must not be empty"));
        }
        if ttl <= Duration::zero() {
            return Err(Error::validation("Session lifetime must be positive"));
        }

        let token = generate_token();
        let now = Utc::now();
        let row = SessionDB {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: hash_token(&token),
            created_at: format_timestamp(now),
            expires_at: format_timestamp(now + ttl),
            revoked_at: None,
        };
        let issued = IssuedSession {
            session_id: row.id.clone(),
            user_id: row.user_id.clone(),
            token,
            expires_at: row.expires_at.clone(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(sessions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        info!("[Auth] Issued session {} for user {}", issued.session_id, issued.user_id);
        Ok(issued)
    }

    /// Revokes a session. Returns false when it was unknown or already revoked.
    pub async fn revoke_session(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(
                    sessions::table
                        .find(&session_id)
                        .filter(sessions::revoked_at.is_null()),
                )
                .set(sessions::revoked_at.eq(format_timestamp(Utc::now())))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    /// Deletes sessions that expired before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_timestamp(now);
        self.writer
            .exec(move |conn| {
                let removed = diesel::delete(sessions::table.filter(sessions::expires_at.le(cutoff)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }
}

#[async_trait]
impl SessionRepositoryTrait for SessionRepository {
    async fn find_active_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let user_id = sessions::table
            .filter(sessions::token_hash.eq(token_hash))
            .filter(sessions::revoked_at.is_null())
            .filter(sessions::expires_at.gt(format_timestamp(now)))
            .select(sessions::user_id)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(user_id)
    }
}
