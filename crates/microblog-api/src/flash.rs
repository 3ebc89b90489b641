//! One-shot messages carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

pub const FLASH_COOKIE: &str = "microblog_flash";

/// Queues `message` for the next rendered page.
pub fn push(jar: CookieJar, message: impl Into<String>) -> CookieJar {
    let mut messages = read(&jar);
    messages.push(message.into());

    let Ok(json) = serde_json::to_vec(&messages) else {
        return jar;
    };

    let mut cookie = Cookie::new(FLASH_COOKIE, URL_SAFE_NO_PAD.encode(json));
    cookie.set_path("/");
    cookie.set_http_only(true);
    jar.add(cookie)
}

/// Drains the queued messages.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<String>) {
    let messages = read(&jar);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, messages);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), messages)
}

fn read(jar: &CookieJar) -> Vec<String> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| URL_SAFE_NO_PAD.decode(c.value()).ok())
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .unwrap_or_default()
}
