use serde::{Deserialize, Serialize};
use validator::Validate;

// -- Session --

/// Claims carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

// -- Auth forms --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    /// Checkbox: present when ticked.
    pub remember_me: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.is_some()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegistrationForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "Username must be between 1 and 64 characters."))]
    pub username: String,
    #[serde(default)]
    #[validate(
        email(message = "Invalid email address."),
        length(max = 120, message = "Email must be at most 120 characters.")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "Passwords must match."))]
    pub password2: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ResetPasswordRequestForm {
    #[serde(default)]
    #[validate(email(message = "Invalid email address."))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "Passwords must match."))]
    pub password2: String,
}

// -- Profile --

/// The about-me limit is configurable, so only the username is checked here.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct EditProfileForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "Username must be between 1 and 64 characters."))]
    pub username: String,
    #[serde(default)]
    pub about_me: String,
}

// -- Posts --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 140, message = "Say something in 1 to 140 characters."))]
    pub post: String,
}
