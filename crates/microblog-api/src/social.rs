//! The follow graph and the feeds computed from it.

use chrono::Utc;
use thiserror::Error;

use microblog_db::{Database, DbError};
use microblog_types::models::{FollowCounts, MAX_POST_LENGTH, Post, User};
use microblog_types::pagination::{Page, PageRequest};

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("You cannot follow yourself!")]
    SelfFollow,

    #[error("You cannot unfollow yourself!")]
    SelfUnfollow,

    #[error("A post must be between 1 and 140 characters.")]
    InvalidBody,

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Adds the edge `actor -> target`. Returns false when it already existed.
pub fn follow(db: &Database, actor: &User, target: &User) -> Result<bool, SocialError> {
    if actor.id == target.id {
        return Err(SocialError::SelfFollow);
    }
    Ok(db.insert_follow(actor.id, target.id)?)
}

/// Removes the edge `actor -> target`. Returns false when there was none.
pub fn unfollow(db: &Database, actor: &User, target: &User) -> Result<bool, SocialError> {
    if actor.id == target.id {
        return Err(SocialError::SelfUnfollow);
    }
    Ok(db.delete_follow(actor.id, target.id)?)
}

pub fn is_following(db: &Database, actor: &User, target: &User) -> Result<bool, DbError> {
    db.is_following(actor.id, target.id)
}

pub fn follow_counts(db: &Database, user: &User) -> Result<FollowCounts, DbError> {
    db.follow_counts(user.id)
}

/// Stores a new post by `author`. The body is trimmed first.
pub fn publish(db: &Database, author: &User, body: &str) -> Result<Post, SocialError> {
    let body = body.trim();
    let len = body.chars().count();
    if len == 0 || len > MAX_POST_LENGTH {
        return Err(SocialError::InvalidBody);
    }

    let timestamp = Utc::now();
    let id = db.insert_post(author.id, body, timestamp)?;

    Ok(Post {
        id,
        body: body.to_string(),
        timestamp,
        author_id: author.id,
        author_username: author.username.clone(),
        author_email: author.email.clone(),
    })
}

/// Own posts plus posts of followed users, newest first.
pub fn followed_feed(db: &Database, user: &User, request: PageRequest) -> Result<Page<Post>, DbError> {
    Ok(db.followed_posts(user.id, request)?.map(Post::from))
}

/// Every post, newest first.
pub fn global_feed(db: &Database, request: PageRequest) -> Result<Page<Post>, DbError> {
    Ok(db.all_posts(request)?.map(Post::from))
}

pub fn user_posts(db: &Database, author: &User, request: PageRequest) -> Result<Page<Post>, DbError> {
    Ok(db.posts_by_user(author.id, request)?.map(Post::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use chrono::Duration;

    fn setup(names: &[&str]) -> (Database, Vec<User>) {
        let db = Database::open_in_memory().unwrap();
        let users = names
            .iter()
            .map(|name| {
                identity::register(&db, name, &format!("{name}@example.com"), "pw").unwrap()
            })
            .collect();
        (db, users)
    }

    fn bodies(page: &Page<Post>) -> Vec<&str> {
        page.items.iter().map(|p| p.body.as_str()).collect()
    }

    #[test]
    fn follow_is_idempotent_and_unfollow_restores() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (&users[0], &users[1]);
        let before = db.followed_ids(a.id).unwrap();

        assert!(follow(&db, a, b).unwrap());
        let once = db.followed_ids(a.id).unwrap();
        assert!(!follow(&db, a, b).unwrap());
        assert_eq!(db.followed_ids(a.id).unwrap(), once);
        assert!(is_following(&db, a, b).unwrap());
        assert!(!is_following(&db, b, a).unwrap());

        assert!(unfollow(&db, a, b).unwrap());
        assert_eq!(db.followed_ids(a.id).unwrap(), before);
        assert!(!unfollow(&db, a, b).unwrap());
    }

    #[test]
    fn self_follow_is_rejected() {
        let (db, users) = setup(&["a"]);
        let a = &users[0];

        assert!(matches!(follow(&db, a, a), Err(SocialError::SelfFollow)));
        assert!(matches!(unfollow(&db, a, a), Err(SocialError::SelfUnfollow)));
        assert!(db.followed_ids(a.id).unwrap().is_empty());
    }

    #[test]
    fn feed_always_contains_own_posts() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (&users[0], &users[1]);

        publish(&db, a, "mine").unwrap();
        publish(&db, b, "theirs").unwrap();

        let feed = followed_feed(&db, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(bodies(&feed), vec!["mine"]);

        follow(&db, a, b).unwrap();
        let feed = followed_feed(&db, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(feed.total, 2);
        assert!(bodies(&feed).contains(&"mine"));
    }

    #[test]
    fn followed_posts_newest_first() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (&users[0], &users[1]);
        follow(&db, a, b).unwrap();

        let t0 = Utc::now();
        db.insert_post(b.id, "hello", t0).unwrap();
        db.insert_post(b.id, "world", t0 + Duration::milliseconds(5)).unwrap();

        let feed = followed_feed(&db, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(&bodies(&feed)[..2], &["world", "hello"]);
    }

    #[test]
    fn published_in_quick_succession_still_ordered() {
        let (db, users) = setup(&["a", "b"]);
        let (a, b) = (&users[0], &users[1]);
        follow(&db, a, b).unwrap();

        publish(&db, b, "hello").unwrap();
        publish(&db, b, "world").unwrap();

        let feed = followed_feed(&db, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(bodies(&feed), vec!["world", "hello"]);
    }

    #[test]
    fn pagination_of_own_posts() {
        let (db, users) = setup(&["a"]);
        let a = &users[0];
        for i in 0..5 {
            publish(&db, a, &format!("post {i}")).unwrap();
        }

        let page1 = followed_feed(&db, a, PageRequest::new(1, 2)).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.has_next());
        assert!(!page1.has_prev());

        let page3 = followed_feed(&db, a, PageRequest::new(3, 2)).unwrap();
        assert_eq!(page3.items.len(), 1);
        assert!(!page3.has_next());
        assert!(page3.has_prev());

        let page4 = followed_feed(&db, a, PageRequest::new(4, 2)).unwrap();
        assert!(page4.items.is_empty());
        assert!(!page4.has_next());

        let own = user_posts(&db, a, PageRequest::new(1, 10)).unwrap();
        assert_eq!(own.total, 5);
        assert_eq!(own.items[0].body, "post 4");
    }

    #[test]
    fn global_feed_ignores_follows() {
        let (db, users) = setup(&["a", "b"]);
        publish(&db, &users[0], "one").unwrap();
        publish(&db, &users[1], "two").unwrap();

        let feed = global_feed(&db, PageRequest::new(1, 10)).unwrap();
        assert_eq!(bodies(&feed), vec!["two", "one"]);
    }

    #[test]
    fn publish_enforces_body_length() {
        let (db, users) = setup(&["a"]);
        let a = &users[0];

        assert!(matches!(publish(&db, a, "   "), Err(SocialError::InvalidBody)));
        assert!(matches!(publish(&db, a, &"é".repeat(141)), Err(SocialError::InvalidBody)));

        let post = publish(&db, a, &format!("  {}  ", "é".repeat(140))).unwrap();
        assert_eq!(post.body.chars().count(), 140);
        assert_eq!(post.author_username, "a");
    }

    #[test]
    fn follow_counts_track_edges() {
        let (db, users) = setup(&["a", "b", "c"]);
        follow(&db, &users[0], &users[2]).unwrap();
        follow(&db, &users[1], &users[2]).unwrap();
        follow(&db, &users[2], &users[0]).unwrap();

        let counts = follow_counts(&db, &users[2]).unwrap();
        assert_eq!(counts, FollowCounts { followers: 2, following: 1 });
    }
}
