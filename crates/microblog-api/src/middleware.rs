use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};

use microblog_types::api::Claims;
use microblog_types::models::User;

use crate::auth::AppState;
use crate::identity::IdentityError;

pub const SESSION_COOKIE: &str = "microblog_session";

const REMEMBER_FOR_DAYS: i64 = 30;
const SESSION_FOR_DAYS: i64 = 1;

/// The visitor as resolved from the session cookie.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user: Option<User>,
}

/// Present on routes behind [`require_login`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Adds a signed session cookie for `user_id`. Without `remember` the cookie
/// lasts until the browser closes.
pub fn start_session(
    jar: CookieJar,
    secret: &str,
    user_id: i64,
    remember: bool,
) -> Result<CookieJar, IdentityError> {
    let days = if remember { REMEMBER_FOR_DAYS } else { SESSION_FOR_DAYS };
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now() + Duration::days(days)).timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if remember {
        cookie = cookie.max_age(time::Duration::days(days));
    }

    Ok(jar.add(cookie))
}

pub fn end_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

fn session_user_id(secret: &str, token: &str) -> Option<i64> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims.sub)
    .map_err(|e| debug!("Ignoring session cookie: {}", e))
    .ok()
}

/// Resolves the session cookie into a [`Session`] extension and records the
/// visit in `last_seen`.
pub async fn resolve_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let user_id = jar
        .get(SESSION_COOKIE)
        .and_then(|c| session_user_id(&state.config.secret_key, c.value()));

    let mut session = Session::default();
    if let Some(id) = user_id {
        match state.db.get_user_by_id(id) {
            Ok(Some(row)) => {
                let now = Utc::now();
                if let Err(e) = state.db.touch_last_seen(row.id, now) {
                    warn!("Failed to update last_seen for user {}: {}", row.id, e);
                }
                let mut user = User::from(row);
                user.last_seen = now;
                session.user = Some(user);
            }
            Ok(None) => debug!("Session refers to missing user {}", id),
            Err(e) => return crate::error::AppError::from(e).into_response(),
        }
    }

    req.extensions_mut().insert(session);
    next.run(req).await
}

/// Redirects anonymous visitors to the login page, remembering where they were headed.
pub async fn require_login(mut req: Request, next: Next) -> Response {
    let user = req
        .extensions()
        .get::<Session>()
        .and_then(|s| s.user.clone());

    match user {
        Some(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        None => {
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            Redirect::to(&format!("/login?next={}", urlencoding::encode(target))).into_response()
        }
    }
}

/// Only same-site paths are accepted as a post-login destination.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/index",
    }
}
