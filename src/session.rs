use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::identity::Identity;
use crate::store::CredentialStore;
use crate::token::{Claims, TokenCodec, TokenKind, TokenPair};
use crate::utils::sha256_hex;

/// The currently recorded session for one identity. Holds SHA-256 hashes of
/// the token pair, never the raw tokens.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub identity_uuid: Uuid,
    pub access_hash: String,
    pub refresh_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Session persistence, keyed by identity uuid. One record per identity;
/// `put` must atomically replace any existing record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, identity_uuid: Uuid) -> Result<Option<SessionRecord>, AppError>;
    async fn put(&self, record: SessionRecord) -> Result<(), AppError>;
    async fn update_access(&self, identity_uuid: Uuid, access_hash: String) -> Result<(), AppError>;
    async fn remove(&self, identity_uuid: Uuid) -> Result<(), AppError>;
}

/// In-process session store. The write lock serializes concurrent `issue`
/// calls for the same identity, so two near-simultaneous logins cannot both
/// end up recorded.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<Uuid, SessionRecord>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, identity_uuid: Uuid) -> Result<Option<SessionRecord>, AppError> {
        let records = self.records.read().await;
        match records.get(&identity_uuid) {
            Some(record) if record.expires_at > Utc::now() => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, record: SessionRecord) -> Result<(), AppError> {
        self.records
            .write()
            .await
            .insert(record.identity_uuid, record);
        Ok(())
    }

    async fn update_access(
        &self,
        identity_uuid: Uuid,
        access_hash: String,
    ) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(&identity_uuid) {
            Some(record) => {
                record.access_hash = access_hash;
                Ok(())
            }
            None => Err(AppError::SessionSuperseded),
        }
    }

    async fn remove(&self, identity_uuid: Uuid) -> Result<(), AppError> {
        self.records.write().await.remove(&identity_uuid);
        Ok(())
    }
}

/// Issues, validates, refreshes and revokes the signed token pair, and owns
/// the session record lifecycle exclusively.
#[derive(Clone)]
pub struct SessionService {
    codec: TokenCodec,
    store: Arc<dyn SessionStore>,
    credentials: Arc<dyn CredentialStore>,
    refresh_ttl: Duration,
    store_timeout: Duration,
}

impl SessionService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(config),
            store,
            credentials,
            refresh_ttl: config.refresh_token_ttl,
            store_timeout: config.store_timeout,
        }
    }

    /// Issues a fresh token pair. For single-login identities the pair is
    /// recorded as *the* current session, superseding any prior one.
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        let pair = self.codec.issue_pair(identity.uuid)?;

        if !identity.multi_login {
            let now = Utc::now();
            let record = SessionRecord {
                identity_uuid: identity.uuid,
                access_hash: sha256_hex(&pair.access_token),
                refresh_hash: sha256_hex(&pair.refresh_token),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.refresh_ttl.as_secs() as i64),
            };
            self.timed(self.store.put(record)).await?;
            tracing::debug!(identity = %identity.uuid, "session recorded");
        }

        Ok(pair)
    }

    /// Verifies signature and expiry, hydrates the identity, and for
    /// single-login identities checks the token against the recorded session.
    pub async fn validate(&self, access_token: &str) -> Result<Identity, AppError> {
        let claims = self.codec.decode(access_token, TokenKind::Access)?;
        let identity = self.load_identity(&claims).await?;

        if !identity.multi_login {
            self.check_current(&identity, access_token, TokenKind::Access)
                .await?;
        }

        Ok(identity)
    }

    /// Validates a refresh token and re-issues the access token, preserving
    /// the session record's refresh side.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.codec.decode(refresh_token, TokenKind::Refresh)?;
        let identity = self.load_identity(&claims).await?;

        if !identity.multi_login {
            self.check_current(&identity, refresh_token, TokenKind::Refresh)
                .await?;
        }

        let access_token = self.codec.encode(identity.uuid, TokenKind::Access)?;

        if !identity.multi_login {
            self.timed(
                self.store
                    .update_access(identity.uuid, sha256_hex(&access_token)),
            )
            .await?;
        }

        tracing::debug!(identity = %identity.uuid, "access token rotated");

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Clears the recorded session; previously issued tokens of a
    /// single-login identity then fail validation with `SessionSuperseded`.
    pub async fn revoke(&self, identity_uuid: Uuid) -> Result<(), AppError> {
        self.timed(self.store.remove(identity_uuid)).await?;
        tracing::debug!(identity = %identity_uuid, "session revoked");
        Ok(())
    }

    async fn load_identity(&self, claims: &Claims) -> Result<Identity, AppError> {
        let identity = self
            .timed(self.credentials.get_identity(claims.sub))
            .await?
            .ok_or_else(|| AppError::token_invalid("unknown identity"))?;

        if !identity.enabled {
            return Err(AppError::IdentityDisabled);
        }

        Ok(identity)
    }

    async fn check_current(
        &self,
        identity: &Identity,
        token: &str,
        kind: TokenKind,
    ) -> Result<(), AppError> {
        let record = self
            .timed(self.store.get(identity.uuid))
            .await?
            .ok_or(AppError::SessionSuperseded)?;

        let recorded = match kind {
            TokenKind::Access => &record.access_hash,
            TokenKind::Refresh => &record.refresh_hash,
        };

        if *recorded != sha256_hex(token) {
            return Err(AppError::SessionSuperseded);
        }

        Ok(())
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| AppError::SessionStoreUnavailable("session store timed out".into()))?
    }
}
