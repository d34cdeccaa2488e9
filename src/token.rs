use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::AppError;

/// Discriminates access tokens from refresh tokens so one can never be
/// presented in place of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Stable external identity id.
    pub sub: Uuid,
    /// Per-token id. Two tokens for the same identity are never
    /// byte-identical, even when signed within the same second, so session
    /// hash comparison can always tell them apart.
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// HS256 codec for the signed access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: Arc<Vec<u8>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            secret: config.token_secret.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    pub fn issue_pair(&self, identity_uuid: Uuid) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.encode(identity_uuid, TokenKind::Access)?,
            refresh_token: self.encode(identity_uuid, TokenKind::Refresh)?,
        })
    }

    pub fn encode(&self, identity_uuid: Uuid, kind: TokenKind) -> Result<String, AppError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::seconds(ttl.as_secs() as i64);

        let claims = Claims {
            sub: identity_uuid,
            jti: Uuid::new_v4(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
            kind,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::internal(format!("failed to sign token: {err}")))
    }

    /// Verifies signature and expiry, and that the token is of the expected
    /// kind. Expiry maps to `TokenExpired`; everything else is `TokenInvalid`.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::token_invalid(err.to_string()),
        })?;

        if claims.kind != expected {
            return Err(AppError::token_invalid("wrong token kind"));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(access_secs: u64) -> TokenCodec {
        TokenCodec {
            secret: Arc::new(b"test-secret".to_vec()),
            access_ttl: Duration::from_secs(access_secs),
            refresh_ttl: Duration::from_secs(access_secs * 7),
        }
    }

    #[test]
    fn round_trips_access_claims() {
        let codec = codec(3600);
        let id = Uuid::new_v4();
        let pair = codec.issue_pair(id).unwrap();

        let claims = codec.decode(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn pairs_issued_back_to_back_are_distinct() {
        let codec = codec(3600);
        let id = Uuid::new_v4();

        // Same identity, same second: the jti still makes each token unique.
        let first = codec.issue_pair(id).unwrap();
        let second = codec.issue_pair(id).unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn rejects_refresh_token_presented_as_access() {
        let codec = codec(3600);
        let pair = codec.issue_pair(Uuid::new_v4()).unwrap();

        let err = codec
            .decode(&pair.refresh_token, TokenKind::Access)
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }

    #[test]
    fn rejects_garbage_token() {
        let codec = codec(3600);
        let err = codec.decode("not-a-jwt", TokenKind::Access).unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let codec_a = codec(3600);
        let mut codec_b = codec(3600);
        codec_b.secret = Arc::new(b"other-secret".to_vec());

        let pair = codec_a.issue_pair(Uuid::new_v4()).unwrap();
        let err = codec_b
            .decode(&pair.access_token, TokenKind::Access)
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }
}
