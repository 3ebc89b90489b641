pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod flash;
pub mod identity;
pub mod middleware;
pub mod posts;
pub mod social;
pub mod users;
pub mod views;

use axum::{
    Router, middleware as mw,
    routing::{get, post},
};

use auth::AppState;
use middleware::{require_login, resolve_session};

/// All routes, with session resolution applied. Callers add their own
/// tracing layer.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/register", get(auth::register_page).post(auth::register))
        .route(
            "/reset_password_request",
            get(auth::reset_password_request_page).post(auth::reset_password_request),
        )
        .route(
            "/reset_password/{token}",
            get(auth::reset_password_page).post(auth::reset_password),
        );

    let protected = Router::new()
        .route("/", get(posts::index).post(posts::publish))
        .route("/index", get(posts::index).post(posts::publish))
        .route("/explore", get(posts::explore))
        .route("/user/{username}", get(users::profile))
        .route(
            "/edit_profile",
            get(users::edit_profile_page).post(users::edit_profile),
        )
        .route("/follow/{username}", post(users::follow))
        .route("/unfollow/{username}", post(users::unfollow))
        .layer(mw::from_fn(require_login));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(error::not_found)
        .layer(mw::from_fn_with_state(state.clone(), resolve_session))
        .with_state(state)
}
