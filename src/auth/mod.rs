//! Bearer token authentication.
//!
//! Identity is owned by an external provider; this service only verifies
//! HS256 tokens it issued and reads the caller and tenant from the claims.

mod extractor;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::error::{AppError, AppResult};

pub use extractor::AuthenticatedUser;

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub tenant_id: Uuid,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies access tokens. Registered as app data for the extractor.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(settings.jwt_secret.expose_secret().as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<AuthenticatedUser> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid access token: {}", e)))?;

        if data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "Access token has no subject".to_string(),
            ));
        }

        Ok(AuthenticatedUser {
            user_id: data.claims.sub,
            tenant_id: data.claims.tenant_id,
        })
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenVerifier([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;

    fn settings(issuer: Option<&str>) -> AuthSettings {
        AuthSettings {
            jwt_secret: SecretString::from("test-secret".to_string()),
            issuer: issuer.map(str::to_string),
        }
    }

    fn token(secret: &str, sub: &str, tenant_id: Uuid, iss: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            tenant_id,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            iss: iss.map(str::to_string),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_user_and_tenant() {
        let tenant = Uuid::new_v4();
        let verifier = TokenVerifier::new(&settings(None));
        let user = verifier
            .verify(&token("test-secret", "user-1", tenant, None, 3600))
            .unwrap();
        assert_eq!(user.user_id, "user-1");
        assert_eq!(user.tenant_id, tenant);
    }

    #[test]
    fn test_rejects_bad_signature_and_expired_tokens() {
        let verifier = TokenVerifier::new(&settings(None));
        let tenant = Uuid::new_v4();
        assert!(matches!(
            verifier.verify(&token("other-secret", "u", tenant, None, 3600)),
            Err(AppError::Unauthorized(_))
        ));
        assert!(
            verifier
                .verify(&token("test-secret", "u", tenant, None, -3600))
                .is_err()
        );
        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_issuer_checked_when_configured() {
        let verifier = TokenVerifier::new(&settings(Some("https://id.example.com")));
        let tenant = Uuid::new_v4();
        assert!(
            verifier
                .verify(&token("test-secret", "u", tenant, Some("https://id.example.com"), 3600))
                .is_ok()
        );
        assert!(
            verifier
                .verify(&token("test-secret", "u", tenant, Some("https://evil.example.com"), 3600))
                .is_err()
        );
    }
}
