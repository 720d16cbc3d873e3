//! The signed-in user for one request.
//!
//! Resolved once per request from the bearer token (header or
//! `access_token` cookie) and cached in the request extensions, so every
//! handler and loader shares the same answer.

use std::future::Future;
use std::pin::Pin;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use tracing::warn;

use crate::core::errors::ApiError;
use crate::core::store::{AuthUser, StoreClient};

pub const TOKEN_COOKIE: &str = "access_token";

#[derive(Clone, Debug)]
pub struct Session {
    pub user: Option<AuthUser>,
    /// Store client acting as the user, or anonymously when signed out.
    pub store: StoreClient,
}

impl Session {
    pub async fn resolve(store: &StoreClient, token: Option<&str>) -> Self {
        let scoped = store.with_token(token);
        let user = match scoped.current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!("session lookup failed: {}", err.message());
                None
            }
        };

        let store = if user.is_some() { scoped } else { store.with_token(None) };
        Self { user, store }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn require_user(&self) -> Result<&str, ApiError> {
        self.user_id().ok_or(ApiError::Unauthorized)
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    header.or_else(|| req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string()))
}

impl FromRequest for Session {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if let Some(session) = req.extensions().get::<Session>() {
            let session = session.clone();
            return Box::pin(async move { Ok(session) });
        }

        let req = req.clone();
        Box::pin(async move {
            let store = req
                .app_data::<web::Data<StoreClient>>()
                .map(|data| data.get_ref().clone())
                .ok_or_else(|| ApiError::InternalError("Store client not configured".to_string()))?;
            let token = bearer_token(&req);

            let session = Session::resolve(&store, token.as_deref()).await;
            req.extensions_mut().insert(session.clone());
            Ok(session)
        })
    }
}
