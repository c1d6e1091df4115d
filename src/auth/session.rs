use axum::{
    extract::FromRef,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{extractors::TOKEN_COOKIE, jwt::JwtKeys};
use crate::{
    config::AppConfig,
    error::AppResult,
    response::Envelope,
    state::AppState,
    users::repo_types::User,
};

/// Body returned whenever a user signs in by any route.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Signs a token for `user` and answers with it in the body and the cookie.
pub fn start(state: &AppState, user: User, message: &str) -> AppResult<Response> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id, user.role)?;
    let cookie = token_cookie(&state.config, &token, keys.ttl.as_secs());
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(Envelope::ok(message, Session { user, token })),
    )
        .into_response())
}

pub fn token_cookie(cfg: &AppConfig, token: &str, max_age: u64) -> HeaderValue {
    let mut cookie = format!("{TOKEN_COOKIE}={token}; HttpOnly; Path=/; Max-Age={max_age}");
    // Cross-site cookies need SameSite=None, which browsers only accept with Secure.
    if cfg.cookie_secure {
        cookie.push_str("; Secure; SameSite=None");
    } else {
        cookie.push_str("; SameSite=Lax");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static("token=; Max-Age=0"))
}

pub fn cleared_cookie(cfg: &AppConfig) -> HeaderValue {
    token_cookie(cfg, "", 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn secure_cookie_is_http_only_and_cross_site() {
        let state = AppState::fake();
        let cookie = token_cookie(&state.config, "abc", 60);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=60"));
    }

    #[tokio::test]
    async fn cleared_cookie_expires_immediately() {
        let state = AppState::fake();
        let cookie = cleared_cookie(&state.config);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
