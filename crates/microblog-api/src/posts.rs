use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use microblog_types::api::PostForm;
use microblog_types::pagination::PageRequest;

use crate::auth::AppState;
use crate::error::AppResult;
use crate::flash;
use crate::middleware::CurrentUser;
use crate::social;
use crate::views::{FormErrors, PostPage};

/// `?page=N`. Anything that is not a positive number means the first page.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn request(&self, per_page: u32) -> PageRequest {
        let page = self
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(1);
        PageRequest::new(page, per_page)
    }
}

pub async fn index(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let request = query.request(state.config.posts_per_page);
    let page = social::followed_feed(&state.db, &user, request)?;

    let body = json!({
        "form": {},
        "errors": {},
        "page": PostPage::from(page),
    });
    Ok(state.views.page(jar, Some(&user), "index.html", "Home", body)?.into_response())
}

pub async fn publish(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let trimmed = PostForm {
        post: form.post.trim().to_string(),
    };

    if let Err(errors) = trimmed.validate() {
        let page = social::followed_feed(
            &state.db,
            &user,
            PageRequest::new(1, state.config.posts_per_page),
        )?;
        let body = json!({
            "form": { "post": form.post },
            "errors": FormErrors::from(errors),
            "page": PostPage::from(page),
        });
        return Ok(state.views.page(jar, Some(&user), "index.html", "Home", body)?.into_response());
    }

    let post = social::publish(&state.db, &user, &trimmed.post)?;
    info!("User {} published post {}", user.id, post.id);

    let jar = flash::push(jar, "Your post is now live!");
    Ok((jar, Redirect::to("/index")).into_response())
}

pub async fn explore(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
    jar: CookieJar,
) -> AppResult<Response> {
    let page = social::global_feed(&state.db, query.request(state.config.posts_per_page))?;

    let body = json!({ "page": PostPage::from(page) });
    Ok(state.views.page(jar, Some(&user), "index.html", "Explore", body)?.into_response())
}
