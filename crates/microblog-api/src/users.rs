use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::info;
use validator::Validate;

use microblog_db::DbError;
use microblog_types::api::EditProfileForm;
use microblog_types::models::User;

use crate::auth::AppState;
use crate::error::{AppError, AppResult};
use crate::flash;
use crate::middleware::CurrentUser;
use crate::posts::PageQuery;
use crate::social::{self, SocialError};
use crate::views::{FormErrors, PostPage, UserView};

fn profile_url(username: &str) -> String {
    format!("/user/{}", urlencoding::encode(username))
}

fn find_user(state: &AppState, username: &str) -> Result<Option<User>, DbError> {
    Ok(state.db.get_user_by_username(username)?.map(User::from))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let user = find_user(&state, &username)?
        .ok_or_else(|| AppError::NotFound(format!("user {username}")))?;

    let page = social::user_posts(&state.db, &user, query.request(state.config.posts_per_page))?;
    let body = json!({
        "user": UserView::from(&user),
        "counts": social::follow_counts(&state.db, &user)?,
        "is_self": user.id == viewer.id,
        "is_following": social::is_following(&state.db, &viewer, &user)?,
        "page": PostPage::from(page),
    });
    let title = user.username.clone();
    Ok(state.views.page(jar, Some(&viewer), "user.html", &title, body)?.into_response())
}

pub async fn edit_profile_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> AppResult<Response> {
    let body = json!({
        "form": { "username": user.username, "about_me": user.about_me },
        "errors": {},
    });
    Ok(state
        .views
        .page(jar, Some(&user), "edit_profile.html", "Edit Profile", body)?
        .into_response())
}

pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<EditProfileForm>,
) -> AppResult<Response> {
    let mut errors = form.validate().err().map(FormErrors::from).unwrap_or_default();

    let max = state.config.about_me_max_length;
    if form.about_me.chars().count() > max {
        errors.add("about_me", format!("About me must be at most {max} characters."));
    }

    let renamed = form.username != user.username;
    if renamed && !errors.has("username") && find_user(&state, &form.username)?.is_some() {
        errors.add("username", "Please use a different username.");
    }

    if errors.is_empty() {
        let about_me = Some(form.about_me.trim()).filter(|a| !a.is_empty());
        match state.db.update_profile(user.id, &form.username, about_me) {
            Ok(()) => {
                info!("User {} updated their profile", user.id);
                let jar = flash::push(jar, "Your changes have been saved.");
                return Ok((jar, Redirect::to(&profile_url(&form.username))).into_response());
            }
            Err(DbError::UniqueViolation { .. }) => {
                errors.add("username", "Please use a different username.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let body = json!({
        "form": { "username": form.username, "about_me": form.about_me },
        "errors": errors,
    });
    Ok(state
        .views
        .page(jar, Some(&user), "edit_profile.html", "Edit Profile", body)?
        .into_response())
}

pub async fn follow(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(username): Path<String>,
    jar: CookieJar,
) -> AppResult<Response> {
    let Some(target) = find_user(&state, &username)? else {
        let jar = flash::push(jar, format!("User {username} not found."));
        return Ok((jar, Redirect::to("/index")).into_response());
    };

    let message = match social::follow(&state.db, &actor, &target) {
        Ok(_) => {
            info!("User {} follows {}", actor.id, target.id);
            format!("You are following {}!", target.username)
        }
        Err(e @ SocialError::SelfFollow) => e.to_string(),
        Err(e) => return Err(e.into()),
    };

    let jar = flash::push(jar, message);
    Ok((jar, Redirect::to(&profile_url(&target.username))).into_response())
}

pub async fn unfollow(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(username): Path<String>,
    jar: CookieJar,
) -> AppResult<Response> {
    let Some(target) = find_user(&state, &username)? else {
        let jar = flash::push(jar, format!("User {username} not found."));
        return Ok((jar, Redirect::to("/index")).into_response());
    };

    let message = match social::unfollow(&state.db, &actor, &target) {
        Ok(_) => {
            info!("User {} unfollowed {}", actor.id, target.id);
            format!("You are not following {}.", target.username)
        }
        Err(e @ SocialError::SelfUnfollow) => e.to_string(),
        Err(e) => return Err(e.into()),
    };

    let jar = flash::push(jar, message);
    Ok((jar, Redirect::to(&profile_url(&target.username))).into_response())
}
