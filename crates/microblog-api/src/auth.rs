use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use validator::Validate;

use microblog_db::{Database, DbError};
use microblog_types::api::{LoginForm, RegistrationForm, ResetPasswordForm, ResetPasswordRequestForm};
use microblog_types::models::User;

use crate::config::Config;
use crate::email::{Mailer, password_reset_mail};
use crate::error::AppResult;
use crate::flash;
use crate::identity::{self, IdentityError};
use crate::middleware::{Session, end_session, safe_next, start_session};
use crate::views::{FormErrors, Views};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub views: Views,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

fn home() -> Response {
    Redirect::to("/index").into_response()
}

// -- Login / logout --

pub async fn login_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }
    let body = json!({ "form": {}, "errors": {}, "next": query.next });
    Ok(state.views.page(jar, None, "login.html", "Sign In", body)?.into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }

    if let Err(errors) = form.validate() {
        let body = json!({
            "form": { "username": form.username },
            "errors": FormErrors::from(errors),
            "next": query.next,
        });
        return Ok(state.views.page(jar, None, "login.html", "Sign In", body)?.into_response());
    }

    let Some(user) = identity::authenticate(&state.db, &form.username, &form.password)? else {
        info!("Failed login for {:?}", form.username);
        let jar = flash::push(jar, "Invalid username or password");
        return Ok((jar, Redirect::to("/login")).into_response());
    };

    let jar = start_session(jar, &state.config.secret_key, user.id, form.remember())?;
    info!("User {} logged in", user.username);
    let target = safe_next(query.next.as_deref()).to_string();
    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn logout(jar: CookieJar) -> Response {
    (end_session(jar), Redirect::to("/index")).into_response()
}

// -- Registration --

pub async fn register_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }
    let body = json!({ "form": {}, "errors": {} });
    Ok(state.views.page(jar, None, "register.html", "Register", body)?.into_response())
}

pub async fn register(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<RegistrationForm>,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }

    let mut errors = form.validate().err().map(FormErrors::from).unwrap_or_default();
    if !errors.has("username") && state.db.get_user_by_username(&form.username)?.is_some() {
        errors.add("username", "Please use a different username.");
    }
    if !errors.has("email") && state.db.get_user_by_email(&form.email)?.is_some() {
        errors.add("email", "Please use a different email address.");
    }

    if errors.is_empty() {
        match identity::register(&state.db, &form.username, &form.email, &form.password) {
            Ok(user) => {
                info!("Registered user {} ({})", user.username, user.id);
                let jar = flash::push(jar, "Congratulations, you are now a registered user!");
                return Ok((jar, Redirect::to("/login")).into_response());
            }
            // Lost a race with a concurrent registration.
            Err(IdentityError::Db(e @ DbError::UniqueViolation { .. })) => {
                if e.violates("email") {
                    errors.add("email", "Please use a different email address.");
                } else {
                    errors.add("username", "Please use a different username.");
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let body = json!({
        "form": { "username": form.username, "email": form.email },
        "errors": errors,
    });
    Ok(state.views.page(jar, None, "register.html", "Register", body)?.into_response())
}

// -- Password reset --

pub async fn reset_password_request_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }
    let body = json!({ "form": {}, "errors": {} });
    Ok(state
        .views
        .page(jar, None, "reset_password_request.html", "Reset Password", body)?
        .into_response())
}

pub async fn reset_password_request(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<ResetPasswordRequestForm>,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }

    if let Err(errors) = form.validate() {
        let body = json!({ "form": { "email": form.email }, "errors": FormErrors::from(errors) });
        return Ok(state
            .views
            .page(jar, None, "reset_password_request.html", "Reset Password", body)?
            .into_response());
    }

    if let Some(row) = state.db.get_user_by_email(&form.email)? {
        send_password_reset(&state, &User::from(row)).await?;
    }

    let jar = flash::push(jar, "Check your email for the instructions to reset your password");
    Ok((jar, Redirect::to("/login")).into_response())
}

/// Delivery runs in the background and failures are only logged, so the
/// response does not depend on whether the address is registered.
async fn send_password_reset(state: &AppState, user: &User) -> AppResult<()> {
    let token = identity::issue_reset_token(
        &state.config.secret_key,
        user,
        state.config.reset_token_ttl,
    )?;
    let mail = password_reset_mail(&state.config.base_url, user, &token);

    let mailer = state.mailer.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        match mailer.send(mail).await {
            Ok(()) => info!("Password reset mail sent to user {}", user_id),
            Err(e) => error!("Failed to send password reset mail to user {}: {:#}", user_id, e),
        }
    });
    Ok(())
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(token): Path<String>,
    jar: CookieJar,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }
    if identity::verify_reset_token(&state.db, &state.config.secret_key, &token)?.is_none() {
        return Ok(invalid_reset_link(jar));
    }

    let body = json!({ "errors": {} });
    Ok(state
        .views
        .page(jar, None, "reset_password.html", "Reset Password", body)?
        .into_response())
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(token): Path<String>,
    jar: CookieJar,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Response> {
    if session.user.is_some() {
        return Ok(home());
    }
    let Some(user) = identity::verify_reset_token(&state.db, &state.config.secret_key, &token)?
    else {
        return Ok(invalid_reset_link(jar));
    };

    if let Err(errors) = form.validate() {
        let body = json!({ "errors": FormErrors::from(errors) });
        return Ok(state
            .views
            .page(jar, None, "reset_password.html", "Reset Password", body)?
            .into_response());
    }

    identity::set_password(&state.db, &user, &form.password)?;
    info!("Password reset for user {}", user.id);
    let jar = flash::push(jar, "Your password has been reset.");
    Ok((jar, Redirect::to("/login")).into_response())
}

fn invalid_reset_link(jar: CookieJar) -> Response {
    let jar = flash::push(jar, "Your password reset link is invalid or has expired.");
    (jar, Redirect::to("/index")).into_response()
}
