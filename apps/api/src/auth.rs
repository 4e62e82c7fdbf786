//! Identity binding.
//!
//! Tokens are issued elsewhere; this module only verifies them and answers
//! "who is this and may they see that application".

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts, HeaderMap, Uri},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::account::Role;
use crate::models::application::Application;
use crate::models::vacancy::Posting;
use crate::state::AppState;
use crate::store::{Store, StoreError};

const SUBJECT_PREFIX: &str = "user:";
const TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token found")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token subject")]
    InvalidSubject,

    #[error("Account not found")]
    UnknownAccount,

    #[error("Forbidden: not your application")]
    NotYourApplication,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotYourApplication => AppError::Forbidden,
            AuthError::Store(e) => e.into(),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// `user:<uuid>`
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token validation failed: {e}");
                AuthError::InvalidToken
            })
    }
}

/// A verified caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
    /// Set when the token is scoped to a single application.
    pub application_id: Option<Uuid>,
}

impl Identity {
    /// Candidate-side access used by the session channel.
    pub fn ensure_owns(&self, application: &Application) -> Result<(), AuthError> {
        let scoped_elsewhere = self
            .application_id
            .is_some_and(|scoped| scoped != application.id);
        if scoped_elsewhere || !application.is_owned_by(&self.email) {
            return Err(AuthError::NotYourApplication);
        }
        Ok(())
    }

    /// Read access: admins, the employer who owns the vacancy, or the candidate.
    pub fn can_view(&self, application: &Application, posting: Option<&Posting>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Employer if posting.and_then(|p| p.created_by) == Some(self.user_id) => true,
            _ => application.is_owned_by(&self.email),
        }
    }
}

/// Verifies a raw token and resolves the account behind it.
pub async fn identify(
    store: &dyn Store,
    tokens: &TokenVerifier,
    token: Option<&str>,
) -> Result<Identity, AuthError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let claims = tokens.verify(token)?;
    let user_id = claims
        .sub
        .strip_prefix(SUBJECT_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or(AuthError::InvalidSubject)?;
    let account = store
        .account(user_id)
        .await?
        .ok_or(AuthError::UnknownAccount)?;

    // The stored role wins over whatever the token claims.
    if claims.role.as_deref().is_some_and(|r| r != account.role.as_str()) {
        debug!(%user_id, claimed = ?claims.role, "Token role differs from account role");
    }
    Ok(Identity {
        user_id,
        role: account.role,
        email: account.email,
        application_id: claims.application_id,
    })
}

/// Token from the `token` query parameter, the `access_token` cookie, or a
/// bearer header, in that order.
pub fn token_from(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(uri) {
        if let Some(token) = params.get("token").filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }
    }

    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());
    if from_cookie.is_some() {
        return from_cookie;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from(&parts.uri, &parts.headers);
        Ok(identify(state.store.as_ref(), &state.tokens, token.as_deref()).await?)
    }
}

#[cfg(test)]
pub(crate) fn mint_token(secret: &str, user_id: Uuid, application_id: Option<Uuid>) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: format!("{SUBJECT_PREFIX}{user_id}"),
        role: None,
        application_id,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn application(email: &str) -> Application {
        Application {
            id: Uuid::new_v4(),
            vacancy_id: Uuid::new_v4(),
            candidate_email: email.to_string(),
            cv_text: None,
            relevance_score: None,
            mismatches: vec![],
            summary: None,
            status: "submitted".to_string(),
        }
    }

    fn identity(role: Role, email: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role,
            email: email.to_string(),
            application_id: None,
        }
    }

    #[test]
    fn test_token_from_query_first() {
        let uri: Uri = "/ws/applications/x?token=abc".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer zzz"));
        assert_eq!(token_from(&uri, &headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_token_from_cookie_then_bearer() {
        let uri: Uri = "/ws/applications/x".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer zzz"));
        assert_eq!(token_from(&uri, &headers).as_deref(), Some("zzz"));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=from-cookie"),
        );
        assert_eq!(token_from(&uri, &headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_token_from_nothing() {
        let uri: Uri = "/ws/applications/x?other=1".parse().unwrap();
        assert!(token_from(&uri, &HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_identify_resolves_account() {
        let store = MemoryStore::new();
        let account = store.add_account("cand@mail.test", Role::Candidate);
        let tokens = TokenVerifier::new(SECRET);
        let token = mint_token(SECRET, account.id, None);

        let who = identify(&store, &tokens, Some(&token)).await.unwrap();
        assert_eq!(who.user_id, account.id);
        assert_eq!(who.email, "cand@mail.test");
        assert_eq!(who.role, Role::Candidate);
    }

    #[tokio::test]
    async fn test_identify_errors() {
        let store = MemoryStore::new();
        let tokens = TokenVerifier::new(SECRET);

        let err = identify(&store, &tokens, None).await.unwrap_err();
        assert_eq!(err.to_string(), "No authentication token found");

        let err = identify(&store, &tokens, Some("not-a-jwt")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");

        let foreign = mint_token("other-secret", Uuid::new_v4(), None);
        let err = identify(&store, &tokens, Some(&foreign)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");

        let unknown = mint_token(SECRET, Uuid::new_v4(), None);
        assert!(matches!(
            identify(&store, &tokens, Some(&unknown)).await,
            Err(AuthError::UnknownAccount)
        ));
    }

    #[tokio::test]
    async fn test_bad_subject_rejected() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let claims = Claims {
            sub: "42".to_string(),
            role: None,
            application_id: None,
            exp: (chrono::Utc::now().timestamp() + 60) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let store = MemoryStore::new();
        let tokens = TokenVerifier::new(SECRET);
        let err = identify(&store, &tokens, Some(&token)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token subject");
    }

    #[test]
    fn test_ensure_owns() {
        let app = application("Cand@Mail.test");
        let mut who = identity(Role::Candidate, "cand@mail.test");
        assert!(who.ensure_owns(&app).is_ok());

        who.application_id = Some(Uuid::new_v4());
        assert!(matches!(
            who.ensure_owns(&app),
            Err(AuthError::NotYourApplication)
        ));

        let stranger = identity(Role::Candidate, "other@mail.test");
        assert_eq!(
            stranger.ensure_owns(&app).unwrap_err().to_string(),
            "Forbidden: not your application"
        );
    }

    #[test]
    fn test_can_view() {
        let app = application("cand@mail.test");
        let employer = identity(Role::Employer, "hr@corp.test");
        let posting = Posting {
            id: app.vacancy_id,
            created_by: Some(employer.user_id),
            vacancy: Default::default(),
        };

        assert!(identity(Role::Admin, "root@corp.test").can_view(&app, None));
        assert!(employer.can_view(&app, Some(&posting)));
        assert!(!identity(Role::Employer, "x@corp.test").can_view(&app, Some(&posting)));
        assert!(identity(Role::Candidate, "cand@mail.test").can_view(&app, None));
        assert!(!identity(Role::Candidate, "x@mail.test").can_view(&app, None));
    }
}
