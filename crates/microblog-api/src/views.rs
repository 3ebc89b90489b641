//! HTML rendering. Templates are compiled into the binary and autoescaped.

use std::collections::BTreeMap;

use axum::response::Html;
use axum_extra::extract::cookie::CookieJar;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use validator::ValidationErrors;

use microblog_types::models::{Post, User};
use microblog_types::pagination::Page;

use crate::error::AppResult;
use crate::flash;
use crate::identity::avatar_url;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("_post.html", include_str!("../templates/_post.html")),
    ("_pager.html", include_str!("../templates/_pager.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("user.html", include_str!("../templates/user.html")),
    ("edit_profile.html", include_str!("../templates/edit_profile.html")),
    (
        "reset_password_request.html",
        include_str!("../templates/reset_password_request.html"),
    ),
    ("reset_password.html", include_str!("../templates/reset_password.html")),
];

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        for (name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render<C: Serialize>(&self, name: &str, ctx: C) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Renders a full page, draining any queued flash messages into it.
    pub fn page<B: Serialize>(
        &self,
        jar: CookieJar,
        viewer: Option<&User>,
        template: &str,
        title: &str,
        body: B,
    ) -> AppResult<(CookieJar, Html<String>)> {
        let (jar, flashes) = flash::take(jar);
        let frame = Frame {
            title,
            current_user: viewer.map(|u| u.username.as_str()),
            flashes,
            body,
        };
        let html = self.render(template, frame)?;
        Ok((jar, Html(html)))
    }
}

#[derive(Serialize)]
struct Frame<'a, B> {
    title: &'a str,
    current_user: Option<&'a str>,
    flashes: Vec<String>,
    #[serde(flatten)]
    body: B,
}

/// Field name to messages, as shown next to form inputs.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FormErrors::default();
        for (field, errs) in errors.field_errors() {
            for err in errs {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {field}."));
                out.add(&field, message);
            }
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: i64,
    pub body: String,
    pub author: String,
    pub avatar: String,
    pub timestamp: String,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            avatar: avatar_url(&post.author_email, 36),
            id: post.id,
            body: post.body,
            author: post.author_username,
            timestamp: post.timestamp.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub username: String,
    pub avatar: String,
    pub about_me: Option<String>,
    pub last_seen: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            avatar: avatar_url(&user.email, 128),
            about_me: user.about_me.clone(),
            last_seen: user.last_seen.format(DISPLAY_FORMAT).to_string(),
        }
    }
}

/// A page of posts plus the numbers of its neighbours. The pager links are
/// relative (`?page=N`) so the same template serves every listing.
#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub next_num: Option<u32>,
    pub prev_num: Option<u32>,
}

impl From<Page<Post>> for PostPage {
    fn from(page: Page<Post>) -> Self {
        Self {
            next_num: page.next_num(),
            prev_num: page.prev_num(),
            posts: page.items.into_iter().map(PostView::from).collect(),
        }
    }
}
