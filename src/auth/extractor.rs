//! Actix-web extractor for bearer token authentication.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use secrecy::{ExposeSecret, SecretString};
use std::future::{Ready, ready};
use uuid::Uuid;

use super::TokenVerifier;
use crate::error::AppError;

/// Caller identity and tenant scope of a request.
///
/// ```ignore
/// async fn handler(user: AuthenticatedUser) -> impl Responder {
///     // every query is scoped by user.tenant_id
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub tenant_id: Uuid,
}

/// Bearer token from the Authorization header, wrapped as a secret.
fn bearer_token(req: &HttpRequest) -> Option<SecretString> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(SecretString::from(token.trim().to_string()))
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(verifier) = req.app_data::<web::Data<TokenVerifier>>() else {
            tracing::error!("TokenVerifier missing from app data");
            return ready(Err(AppError::Unauthorized(
                "Authentication is not configured".to_string(),
            )));
        };

        let result = match bearer_token(req) {
            Some(token) => verifier.verify(token.expose_secret()),
            None => Err(AppError::Unauthorized(
                "Missing bearer token. Provide an Authorization header.".to_string(),
            )),
        };

        if let Err(e) = &result {
            tracing::debug!(path = %req.path(), error = %e, "Rejected request");
        }
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(
            bearer_token(&req).map(|t| t.expose_secret().to_string()),
            Some("abc.def.ghi".to_string())
        );

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(bearer_token(&req).is_none());

        let req = TestRequest::default().to_http_request();
        assert!(bearer_token(&req).is_none());
    }
}
