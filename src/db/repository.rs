use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Feed, FeedFollow, FeedInfo, NewPost, Post, User};

use super::schema::SCHEMA;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    /// Inserts a new user. Returns `None` if the name is already taken.
    pub async fn create_user(&self, name: &str) -> Result<Option<User>> {
        let name = name.to_string();
        let user = self
            .conn
            .call(move |conn| {
                match conn.execute("INSERT INTO users (name) VALUES (?1)", params![name]) {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                let user = conn.query_row(
                    "SELECT id, name, created_at, updated_at FROM users WHERE id = ?1",
                    params![conn.last_insert_rowid()],
                    |row| Ok(user_from_row(row)),
                )?;
                Ok(Some(user))
            })
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let name = name.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, name, created_at, updated_at FROM users WHERE name = ?1",
                        params![name],
                        |row| Ok(user_from_row(row)),
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn get_users(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
                )?;
                let users = stmt
                    .query_map([], |row| Ok(user_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Deletes every user; feeds, follows and posts go with them via cascade.
    pub async fn reset(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM users", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed operations

    /// Inserts a new feed. Returns `None` if the URL is already tracked.
    pub async fn create_feed(&self, name: &str, url: &str, user_id: i64) -> Result<Option<Feed>> {
        let name = name.to_string();
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO feeds (name, url, user_id) VALUES (?1, ?2, ?3)",
                    params![name, url, user_id],
                ) {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                let feed = conn.query_row(
                    &format!("{FEED_COLUMNS} WHERE id = ?1"),
                    params![conn.last_insert_rowid()],
                    |row| Ok(feed_from_row(row)),
                )?;
                Ok(Some(feed))
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<FeedInfo>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT f.name, f.url, u.name AS creator
                       FROM feeds f
                       JOIN users u ON f.user_id = u.id
                       ORDER BY f.name"#,
                )?;
                let feeds = stmt
                    .query_map([], |row| {
                        Ok(FeedInfo {
                            name: row.get(0)?,
                            url: row.get(1)?,
                            creator: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("{FEED_COLUMNS} WHERE url = ?1"),
                        params![url],
                        |row| Ok(feed_from_row(row)),
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    /// Selects the stalest feed: never-fetched feeds first, then the one
    /// with the oldest `last_fetched_at`.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(|conn| {
                let feed = conn
                    .query_row(
                        &format!(
                            "{FEED_COLUMNS} ORDER BY last_fetched_at ASC NULLS FIRST, id ASC LIMIT 1"
                        ),
                        [],
                        |row| Ok(feed_from_row(row)),
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn mark_feed_fetched(&self, id: i64, fetched_at: DateTime<Utc>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![fetched_at.to_rfc3339(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed follow operations

    /// Inserts a follow relationship. Returns `None` if it already exists.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<Option<FeedFollow>> {
        let follow = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO feed_follows (user_id, feed_id) VALUES (?1, ?2)",
                    params![user_id, feed_id],
                ) {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                let follow = conn.query_row(
                    "SELECT id, user_id, feed_id, created_at, updated_at FROM feed_follows WHERE id = ?1",
                    params![conn.last_insert_rowid()],
                    |row| Ok(feed_follow_from_row(row)),
                )?;
                Ok(Some(follow))
            })
            .await?;
        Ok(follow)
    }

    /// Names of all feeds the user follows.
    pub async fn get_following(&self, user_id: i64) -> Result<Vec<String>> {
        let names = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT f.name
                       FROM feed_follows ff
                       JOIN feeds f ON ff.feed_id = f.id
                       WHERE ff.user_id = ?1
                       ORDER BY f.name"#,
                )?;
                let names = stmt
                    .query_map(params![user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    /// Returns whether a follow was actually removed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let rows = conn.execute(
                    "DELETE FROM feed_follows WHERE user_id = ?1 AND feed_id = ?2",
                    params![user_id, feed_id],
                )?;
                Ok(rows > 0)
            })
            .await?;
        Ok(deleted)
    }

    // Post operations

    /// Inserts a post, returning `false` when its URL is already stored.
    ///
    /// There is no pre-check query; the unique constraint on `posts.url`
    /// is the sole deduplication mechanism.
    pub async fn insert_post(&self, post: NewPost) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    r#"INSERT INTO posts (feed_id, title, url, description, published_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![
                        post.feed_id,
                        post.title,
                        post.url,
                        post.description,
                        post.published_at.map(|dt| dt.to_rfc3339()),
                    ],
                ) {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_recent_posts(&self, limit: i64) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
                       FROM posts
                       ORDER BY published_at DESC NULLS LAST, created_at DESC
                       LIMIT ?1"#,
                )?;
                let posts = stmt
                    .query_map(params![limit], |row| Ok(post_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }
}

const FEED_COLUMNS: &str =
    "SELECT id, name, url, user_id, last_fetched_at, created_at, updated_at FROM feeds";

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        created_at: row
            .get::<_, String>(2)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(3)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn feed_from_row(row: &Row) -> Feed {
    Feed {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        user_id: row.get(3).unwrap(),
        last_fetched_at: row
            .get::<_, Option<String>>(4)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: row
            .get::<_, String>(5)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn feed_follow_from_row(row: &Row) -> FeedFollow {
    FeedFollow {
        id: row.get(0).unwrap(),
        user_id: row.get(1).unwrap(),
        feed_id: row.get(2).unwrap(),
        created_at: row
            .get::<_, String>(3)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn post_from_row(row: &Row) -> Post {
    Post {
        id: row.get(0).unwrap(),
        feed_id: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        url: row.get(3).unwrap(),
        description: row.get(4).unwrap(),
        published_at: row
            .get::<_, Option<String>>(5)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        created_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn repo() -> Repository {
        Repository::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn duplicate_user_name_is_rejected() {
        let repo = repo().await;
        assert!(repo.create_user("alice").await.unwrap().is_some());
        assert!(repo.create_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_feed_url_is_rejected() {
        let repo = repo().await;
        let user = repo.create_user("alice").await.unwrap().unwrap();
        let url = "https://example.com/feed.xml";
        assert!(repo.create_feed("Blog", url, user.id).await.unwrap().is_some());
        assert!(repo.create_feed("Other", url, user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stalest_feed_is_selected_nulls_first() {
        let repo = repo().await;
        let user = repo.create_user("alice").await.unwrap().unwrap();
        let a = repo.create_feed("A", "https://a.example/rss", user.id).await.unwrap().unwrap();
        let b = repo.create_feed("B", "https://b.example/rss", user.id).await.unwrap().unwrap();
        let c = repo.create_feed("C", "https://c.example/rss", user.id).await.unwrap().unwrap();

        let now = Utc::now();
        repo.mark_feed_fetched(b.id, now - Duration::minutes(10)).await.unwrap();
        repo.mark_feed_fetched(c.id, now - Duration::hours(1)).await.unwrap();

        // A has never been fetched, so it goes first.
        let next = repo.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, a.id);
        repo.mark_feed_fetched(a.id, now).await.unwrap();

        // C is older than B.
        let next = repo.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, c.id);
        repo.mark_feed_fetched(c.id, now).await.unwrap();

        let next = repo.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[tokio::test]
    async fn no_feeds_yields_none() {
        let repo = repo().await;
        assert!(repo.next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_post_url_is_skipped() {
        let repo = repo().await;
        let user = repo.create_user("alice").await.unwrap().unwrap();
        let feed = repo.create_feed("Blog", "https://a.example/rss", user.id).await.unwrap().unwrap();
        let other = repo.create_feed("Other", "https://b.example/rss", user.id).await.unwrap().unwrap();

        let post = NewPost {
            feed_id: feed.id,
            title: "Hello".to_string(),
            url: "https://a.example/posts/1".to_string(),
            description: None,
            published_at: None,
        };
        assert!(repo.insert_post(post.clone()).await.unwrap());
        assert!(!repo.insert_post(post.clone()).await.unwrap());

        // The URL is globally unique, so another feed surfacing the same
        // item is also a skip.
        let mut from_other = post;
        from_other.feed_id = other.id;
        assert!(!repo.insert_post(from_other).await.unwrap());

        assert_eq!(repo.get_recent_posts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unfollow_reports_whether_a_row_was_removed() {
        let repo = repo().await;
        let user = repo.create_user("alice").await.unwrap().unwrap();
        let feed = repo.create_feed("Blog", "https://a.example/rss", user.id).await.unwrap().unwrap();

        assert!(repo.create_feed_follow(user.id, feed.id).await.unwrap().is_some());
        assert!(repo.create_feed_follow(user.id, feed.id).await.unwrap().is_none());
        assert_eq!(repo.get_following(user.id).await.unwrap(), vec!["Blog"]);

        assert!(repo.delete_feed_follow(user.id, feed.id).await.unwrap());
        assert!(!repo.delete_feed_follow(user.id, feed.id).await.unwrap());
    }

    #[tokio::test]
    async fn reset_cascades_to_feeds_and_posts() {
        let repo = repo().await;
        let user = repo.create_user("alice").await.unwrap().unwrap();
        let feed = repo.create_feed("Blog", "https://a.example/rss", user.id).await.unwrap().unwrap();
        repo.insert_post(NewPost {
            feed_id: feed.id,
            title: "Hello".to_string(),
            url: "https://a.example/posts/1".to_string(),
            description: None,
            published_at: None,
        })
        .await
        .unwrap();

        repo.reset().await.unwrap();

        assert!(repo.get_users().await.unwrap().is_empty());
        assert!(repo.get_all_feeds().await.unwrap().is_empty());
        assert!(repo.get_recent_posts(10).await.unwrap().is_empty());
    }
}
