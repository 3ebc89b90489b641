//! Credentials: password hashing, login checks, password-reset tokens and
//! avatar URLs.

use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use microblog_db::{Database, DbError};
use microblog_types::models::User;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(plaintext: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Hash(e.to_string()))
}

/// Argon2 compares the derived digests in constant time. A stored value that
/// is not a PHC string never verifies.
pub fn verify_password(hash: &str, plaintext: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

pub fn set_password(db: &Database, user: &User, plaintext: &str) -> Result<(), IdentityError> {
    let hash = hash_password(plaintext)?;
    db.set_password_hash(user.id, &hash)?;
    Ok(())
}

pub fn check_password(db: &Database, user: &User, plaintext: &str) -> Result<bool, DbError> {
    Ok(db
        .get_user_by_id(user.id)?
        .is_some_and(|row| verify_password(&row.password_hash, plaintext)))
}

/// Creates the account. A taken username or email surfaces as
/// `IdentityError::Db(DbError::UniqueViolation { .. })`.
pub fn register(
    db: &Database,
    username: &str,
    email: &str,
    plaintext: &str,
) -> Result<User, IdentityError> {
    let hash = hash_password(plaintext)?;
    let now = Utc::now();
    let id = db.create_user(username, email, &hash, now)?;

    Ok(User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        about_me: None,
        last_seen: now,
    })
}

/// Login check. Returns `None` for an unknown user and for a wrong password alike.
pub fn authenticate(
    db: &Database,
    username: &str,
    plaintext: &str,
) -> Result<Option<User>, IdentityError> {
    match db.get_user_by_username(username)? {
        Some(row) if verify_password(&row.password_hash, plaintext) => Ok(Some(row.into())),
        Some(_) => Ok(None),
        None => {
            // Same amount of hashing as a real miss.
            verify_password(dummy_hash(), plaintext);
            Ok(None)
        }
    }
}

fn dummy_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("no user has this password").unwrap_or_default())
}

// -- Password reset tokens --

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    reset_password: i64,
    exp: i64,
}

pub fn issue_reset_token(secret: &str, user: &User, ttl: Duration) -> Result<String, IdentityError> {
    issue_reset_token_until(secret, user.id, Utc::now() + ttl)
}

pub fn issue_reset_token_until(
    secret: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<String, IdentityError> {
    let claims = ResetClaims {
        reset_password: user_id,
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Resolves a reset token to its user. Bad signatures, malformed tokens,
/// expired tokens and unknown ids all come back as `Ok(None)`.
pub fn verify_reset_token(
    db: &Database,
    secret: &str,
    token: &str,
) -> Result<Option<User>, DbError> {
    let Some(user_id) = decode_reset_token(secret, token, Utc::now()) else {
        return Ok(None);
    };

    Ok(db.get_user_by_id(user_id)?.map(User::from))
}

fn decode_reset_token(secret: &str, token: &str, now: DateTime<Utc>) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let data = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| debug!("Rejected reset token: {}", e))
    .ok()?;

    (now.timestamp() < data.claims.exp).then_some(data.claims.reset_password)
}

// -- Avatars --

/// Gravatar URL for `email`. `size` should be 1..=2048; callers clamp.
pub fn avatar_url(email: &str, size: u32) -> String {
    let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
        hex::encode(digest),
        size
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn db_with_alice() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = register(&db, "alice", "alice@example.com", "wonderland").unwrap();
        (db, user)
    }

    #[test]
    fn password_checks_after_set() {
        let (db, user) = db_with_alice();

        set_password(&db, &user, "looking-glass").unwrap();
        assert!(check_password(&db, &user, "looking-glass").unwrap());
        assert!(!check_password(&db, &user, "wonderland").unwrap());
        assert!(!check_password(&db, &user, "").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
        assert!(!a.contains("same"));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("plaintext-in-the-db", "plaintext-in-the-db"));
    }

    #[test]
    fn authenticate_hides_which_part_was_wrong() {
        let (db, user) = db_with_alice();

        let found = authenticate(&db, "alice", "wonderland").unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(authenticate(&db, "alice", "nope").unwrap().is_none());
        assert!(authenticate(&db, "bob", "wonderland").unwrap().is_none());
    }

    #[test]
    fn reset_token_round_trip() {
        let (db, user) = db_with_alice();

        let token = issue_reset_token(SECRET, &user, Duration::seconds(600)).unwrap();
        let resolved = verify_reset_token(&db, SECRET, &token).unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));
    }

    #[test]
    fn expired_reset_token_is_rejected() {
        let (db, user) = db_with_alice();

        let token =
            issue_reset_token_until(SECRET, user.id, Utc::now() - Duration::seconds(5)).unwrap();
        assert!(verify_reset_token(&db, SECRET, &token).unwrap().is_none());
    }

    #[test]
    fn token_expires_exactly_at_its_deadline() {
        let now = Utc::now();
        let token = issue_reset_token_until(SECRET, 7, now + Duration::seconds(60)).unwrap();

        assert_eq!(decode_reset_token(SECRET, &token, now), Some(7));
        assert_eq!(decode_reset_token(SECRET, &token, now + Duration::seconds(60)), None);
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let (db, user) = db_with_alice();
        let token = issue_reset_token(SECRET, &user, Duration::seconds(600)).unwrap();

        assert!(verify_reset_token(&db, "other-secret", &token).unwrap().is_none());
        assert!(verify_reset_token(&db, SECRET, "not.a.token").unwrap().is_none());

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_reset_token(&db, SECRET, &tampered).unwrap().is_none());
    }

    #[test]
    fn token_for_missing_user_is_none() {
        let (db, _) = db_with_alice();
        let token = issue_reset_token_until(SECRET, 999, Utc::now() + Duration::seconds(60)).unwrap();
        assert!(verify_reset_token(&db, SECRET, &token).unwrap().is_none());
    }

    #[test]
    fn avatar_normalizes_email() {
        assert_eq!(
            avatar_url(" ABC ", 80),
            "https://www.gravatar.com/avatar/900150983cd24fb0d6963f7d28e17f72?d=identicon&s=80"
        );
        assert_eq!(avatar_url("Alice@Example.com", 36), avatar_url("alice@example.com ", 36));
        assert!(avatar_url("", 128).contains("d41d8cd98f00b204e9800998ecf8427e"));
    }
}
