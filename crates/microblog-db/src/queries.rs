use chrono::{DateTime, Utc};
use microblog_types::models::FollowCounts;
use microblog_types::pagination::{Page, PageRequest};
use rusqlite::{Connection, Row, types::ToSql};

use crate::models::{PostRow, UserRow, format_timestamp};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str = "SELECT id, username, email, password_hash, about_me, last_seen FROM users";

const POST_COLUMNS: &str = "SELECT p.id, p.body, p.timestamp, p.user_id, u.username, u.email
     FROM posts p
     JOIN users u ON u.id = p.user_id";

impl Database {
    // -- Users --

    /// Inserts a user and returns its id. A taken username or email comes back
    /// as `DbError::UniqueViolation`.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash, last_seen) VALUES (?1, ?2, ?3, ?4)",
                (username, email, password_hash, format_timestamp(last_seen)),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    pub fn update_profile(&self, id: i64, username: &str, about_me: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET username = ?2, about_me = ?3 WHERE id = ?1",
                rusqlite::params![id, username, about_me],
            )?;
            Ok(())
        })
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                rusqlite::params![id, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                rusqlite::params![id, format_timestamp(at)],
            )?;
            Ok(())
        })
    }

    // -- Posts --

    pub fn insert_post(&self, user_id: i64, body: &str, timestamp: DateTime<Utc>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (body, timestamp, user_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![body, format_timestamp(timestamp), user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Posts by `user_id` and by everyone `user_id` follows, newest first.
    pub fn followed_posts(&self, user_id: i64, request: PageRequest) -> Result<Page<PostRow>> {
        self.with_conn(|conn| {
            query_post_page(
                conn,
                "p.user_id = ?1
                 OR p.user_id IN (SELECT followed_id FROM followers WHERE follower_id = ?1)",
                &[&user_id],
                request,
            )
        })
    }

    pub fn all_posts(&self, request: PageRequest) -> Result<Page<PostRow>> {
        self.with_conn(|conn| query_post_page(conn, "1 = 1", &[], request))
    }

    pub fn posts_by_user(&self, user_id: i64, request: PageRequest) -> Result<Page<PostRow>> {
        self.with_conn(|conn| query_post_page(conn, "p.user_id = ?1", &[&user_id], request))
    }

    // -- Followers --

    /// Returns true when a new edge was stored.
    pub fn insert_follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
                (follower_id, followed_id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns true when an edge was removed.
    pub fn delete_follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                (follower_id, followed_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                    (follower_id, followed_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Ids of the users `follower_id` follows, ascending.
    pub fn followed_ids(&self, follower_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT followed_id FROM followers WHERE follower_id = ?1 ORDER BY followed_id",
            )?;
            let ids = stmt
                .query_map([follower_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    pub fn follow_counts(&self, user_id: i64) -> Result<FollowCounts> {
        self.with_conn(|conn| {
            let (followers, following): (i64, i64) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM followers WHERE followed_id = ?1),
                    (SELECT COUNT(*) FROM followers WHERE follower_id = ?1)",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(FollowCounts {
                followers: followers as u64,
                following: following as u64,
            })
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &dyn ToSql) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_COLUMNS} WHERE {filter}"))?;

    let row = stmt.query_row([value], user_from_row).optional()?;

    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        about_me: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

/// Runs one page of a post listing. `filter` may use placeholders `?1..?n`
/// for `params`; LIMIT and OFFSET are bound after them.
fn query_post_page(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
    request: PageRequest,
) -> Result<Page<PostRow>> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p WHERE ({filter})"),
        params,
        |r| r.get(0),
    )?;

    let n = params.len();
    let sql = format!(
        "{POST_COLUMNS}
         WHERE ({filter})
         ORDER BY p.timestamp DESC, p.id DESC
         LIMIT ?{} OFFSET ?{}",
        n + 1,
        n + 2
    );

    let limit = request.limit();
    let offset = request.offset();
    let mut bound: Vec<&dyn ToSql> = params.to_vec();
    bound.push(&limit);
    bound.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(bound.as_slice(), |row| {
            Ok(PostRow {
                id: row.get(0)?,
                body: row.get(1)?,
                timestamp: row.get(2)?,
                user_id: row.get(3)?,
                author_username: row.get(4)?,
                author_email: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Page::new(rows, request, total as u64))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| {
                db.create_user(name, &format!("{name}@example.com"), "hash", Utc::now())
                    .unwrap()
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let (db, _) = db_with_users(&["alice"]);

        let err = db
            .create_user("alice", "other@example.com", "hash", Utc::now())
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert!(err.violates("username"));
        assert!(!err.violates("email"));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let (db, _) = db_with_users(&["alice"]);

        let err = db
            .create_user("alicia", "alice@example.com", "hash", Utc::now())
            .unwrap_err();
        assert!(err.violates("email"));
    }

    #[test]
    fn user_lookups() {
        let (db, ids) = db_with_users(&["alice", "bob"]);

        let bob = db.get_user_by_username("bob").unwrap().unwrap();
        assert_eq!(bob.id, ids[1]);
        assert_eq!(db.get_user_by_email("alice@example.com").unwrap().unwrap().id, ids[0]);
        assert_eq!(db.get_user_by_id(ids[0]).unwrap().unwrap().username, "alice");
        assert!(db.get_user_by_username("carol").unwrap().is_none());
    }

    #[test]
    fn profile_update_keeps_uniqueness() {
        let (db, ids) = db_with_users(&["alice", "bob"]);

        db.update_profile(ids[0], "alicia", Some("hi")).unwrap();
        let row = db.get_user_by_id(ids[0]).unwrap().unwrap();
        assert_eq!(row.username, "alicia");
        assert_eq!(row.about_me.as_deref(), Some("hi"));

        let err = db.update_profile(ids[0], "bob", None).unwrap_err();
        assert!(err.violates("username"));
    }

    #[test]
    fn follow_edges_are_unique() {
        let (db, ids) = db_with_users(&["alice", "bob"]);

        assert!(db.insert_follow(ids[0], ids[1]).unwrap());
        assert!(!db.insert_follow(ids[0], ids[1]).unwrap());
        assert!(db.is_following(ids[0], ids[1]).unwrap());
        assert!(!db.is_following(ids[1], ids[0]).unwrap());
        assert_eq!(db.followed_ids(ids[0]).unwrap(), vec![ids[1]]);

        let counts = db.follow_counts(ids[1]).unwrap();
        assert_eq!(counts.followers, 1);
        assert_eq!(counts.following, 0);

        assert!(db.delete_follow(ids[0], ids[1]).unwrap());
        assert!(!db.delete_follow(ids[0], ids[1]).unwrap());
        assert!(db.followed_ids(ids[0]).unwrap().is_empty());
    }

    #[test]
    fn followed_posts_union_is_ordered_and_deduplicated() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let (alice, bob, carol) = (ids[0], ids[1], ids[2]);
        let t0 = Utc::now();

        db.insert_post(alice, "alice-1", t0).unwrap();
        db.insert_post(bob, "bob-1", t0 + Duration::seconds(1)).unwrap();
        db.insert_post(carol, "carol-1", t0 + Duration::seconds(2)).unwrap();
        db.insert_post(bob, "bob-2", t0 + Duration::seconds(3)).unwrap();
        db.insert_follow(alice, bob).unwrap();

        let page = db.followed_posts(alice, PageRequest::new(1, 10)).unwrap();
        let bodies: Vec<_> = page.items.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["bob-2", "bob-1", "alice-1"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].author_username, "bob");
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let (db, ids) = db_with_users(&["alice"]);
        let t = Utc::now();

        db.insert_post(ids[0], "first", t).unwrap();
        db.insert_post(ids[0], "second", t).unwrap();

        let page = db.all_posts(PageRequest::new(1, 10)).unwrap();
        assert_eq!(page.items[0].body, "second");
        assert_eq!(page.items[1].body, "first");
    }

    #[test]
    fn posts_by_user_pages() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let t0 = Utc::now();
        for i in 0..5 {
            db.insert_post(ids[0], &format!("post {i}"), t0 + Duration::seconds(i)).unwrap();
        }
        db.insert_post(ids[1], "not alice", t0).unwrap();

        let page = db.posts_by_user(ids[0], PageRequest::new(3, 2)).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].body, "post 0");

        let past_end = db.posts_by_user(ids[0], PageRequest::new(4, 2)).unwrap();
        assert!(past_end.items.is_empty());
        assert!(!past_end.has_next());
    }

    #[test]
    fn oversized_body_is_rejected_by_schema() {
        let (db, ids) = db_with_users(&["alice"]);
        let body = "x".repeat(141);
        assert!(db.insert_post(ids[0], &body, Utc::now()).is_err());
    }
}
