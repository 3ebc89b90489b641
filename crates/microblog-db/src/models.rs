//! Database row types. These map directly to SQLite rows; timestamps stay as
//! the stored text until converted into `microblog_types` models.

use chrono::{DateTime, NaiveDateTime, Utc};
use microblog_types::models::{Post, User};
use tracing::warn;

/// Fixed-width so that text order equals chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .ok()
}

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub about_me: Option<String>,
    pub last_seen: String,
}

pub struct PostRow {
    pub id: i64,
    pub body: String,
    pub timestamp: String,
    pub user_id: i64,
    pub author_username: String,
    pub author_email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let last_seen = parse_timestamp(&row.last_seen).unwrap_or_else(|| {
            warn!("Corrupt last_seen '{}' on user {}", row.last_seen, row.id);
            DateTime::default()
        });

        User {
            id: row.id,
            username: row.username,
            email: row.email,
            about_me: row.about_me,
            last_seen,
        }
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let timestamp = parse_timestamp(&row.timestamp).unwrap_or_else(|| {
            warn!("Corrupt timestamp '{}' on post {}", row.timestamp, row.id);
            DateTime::default()
        });

        Post {
            id: row.id,
            body: row.body,
            timestamp,
            author_id: row.user_id,
            author_username: row.author_username,
            author_email: row.author_email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);

        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&b), Some(late));
    }

    #[test]
    fn parses_rfc3339_fallback() {
        let ts = parse_timestamp("2024-05-01T12:30:00+00:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
