// JWT access token validation

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims carried by a tenant user's access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Tenant the token was issued for
    pub tenant_id: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: Vec<String>,
}

impl JwtClaims {
    /// Get tenant ID
    pub fn tenant_id_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.tenant_id)
            .map_err(|e| AppError::TokenValidation(format!("Invalid tenant UUID: {}", e)))
    }
}

// ============================================================================
// Token verifier
// ============================================================================

/// Validates HS256 access tokens issued by the identity provider
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.len() < 32 {
            return Err(AppError::Configuration(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        })
    }

    /// Validate and decode an access token
    pub fn verify(&self, token: &str) -> Result<JwtClaims> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

/// Sign a token the way the identity provider does
#[cfg(test)]
pub(crate) fn issue_for_tests(config: &AuthConfig, tenant_id: Uuid, ttl_seconds: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        iat: now,
        exp: now + ttl_seconds,
        iss: config.jwt_issuer.clone(),
        aud: vec![config.jwt_audience.clone()],
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap()
}
