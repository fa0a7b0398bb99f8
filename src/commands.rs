use std::time::Duration;

use crate::agg::Aggregator;
use crate::cli::Cmd;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedFetcher;
use crate::models::User;

pub struct State {
    pub repo: Repository,
    pub config: Config,
}

pub async fn run_command(state: &mut State, cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Register { name } => register(state, &name).await,
        Cmd::Login { name } => login(state, &name).await,
        Cmd::Users => users(state).await,
        Cmd::Reset => reset(state).await,
        Cmd::Feeds => feeds(state).await,
        Cmd::Addfeed { name, url } => addfeed(state, &name, &url).await,
        Cmd::Follow { url } => follow(state, &url).await,
        Cmd::Following => following(state).await,
        Cmd::Unfollow { url } => unfollow(state, &url).await,
        Cmd::Agg { interval } => agg(state, interval).await,
        Cmd::Browse { limit } => browse(state, limit).await,
    }
}

/// Resolves the configured user, or errors if nobody is logged in.
async fn require_user(state: &State) -> Result<User> {
    let name = state.config.current_user_name.clone();
    state
        .repo
        .get_user_by_name(&name)
        .await?
        .ok_or(AppError::UserNotFound(name))
}

async fn register(state: &mut State, name: &str) -> Result<()> {
    let name = name.to_lowercase();
    let user = state
        .repo
        .create_user(&name)
        .await?
        .ok_or_else(|| AppError::UserExists(name.clone()))?;

    state.config.set_user(&user.name)?;
    println!("Created user '{}' and logged in.", user.name);
    Ok(())
}

async fn login(state: &mut State, name: &str) -> Result<()> {
    let name = name.to_lowercase();
    let user = state
        .repo
        .get_user_by_name(&name)
        .await?
        .ok_or(AppError::UserNotFound(name))?;

    state.config.set_user(&user.name)?;
    println!("Logged in as '{}'.", user.name);
    Ok(())
}

async fn users(state: &State) -> Result<()> {
    let users = state.repo.get_users().await?;
    if users.is_empty() {
        println!("There are no registered users yet; use 'register' first.");
        return Ok(());
    }

    for user in users {
        if user.name == state.config.current_user_name {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

async fn reset(state: &State) -> Result<()> {
    state.repo.reset().await?;
    println!("Deleted all users, feeds and posts.");
    Ok(())
}

async fn feeds(state: &State) -> Result<()> {
    let feeds = state.repo.get_all_feeds().await?;
    if feeds.is_empty() {
        println!("No feeds in the database yet; use 'addfeed' first.");
        return Ok(());
    }

    for feed in feeds {
        println!("* {}", feed.name);
        println!("  URL:      {}", feed.url);
        println!("  Added by: {}", feed.creator);
    }
    Ok(())
}

async fn addfeed(state: &State, name: &str, url: &str) -> Result<()> {
    let user = require_user(state).await?;

    let Some(feed) = state.repo.create_feed(name, url, user.id).await? else {
        println!("Feed has already been added.");
        return Ok(());
    };

    state.repo.create_feed_follow(user.id, feed.id).await?;
    println!("{} is now following '{}'.", user.name, feed.name);
    Ok(())
}

async fn follow(state: &State, url: &str) -> Result<()> {
    let user = require_user(state).await?;
    let feed = state
        .repo
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| AppError::FeedNotFound(url.to_string()))?;

    match state.repo.create_feed_follow(user.id, feed.id).await? {
        Some(_) => println!("{} is now following '{}'.", user.name, feed.name),
        None => println!("{} already follows '{}'.", user.name, feed.name),
    }
    Ok(())
}

async fn following(state: &State) -> Result<()> {
    let user = require_user(state).await?;
    let names = state.repo.get_following(user.id).await?;

    if names.is_empty() {
        println!("{} is not following any feeds.", user.name);
        return Ok(());
    }

    println!("{} is following:", user.name);
    for name in names {
        println!(" - {name}");
    }
    Ok(())
}

async fn unfollow(state: &State, url: &str) -> Result<()> {
    let user = require_user(state).await?;
    let feed = state
        .repo
        .get_feed_by_url(url)
        .await?
        .ok_or_else(|| AppError::FeedNotFound(url.to_string()))?;

    if state.repo.delete_feed_follow(user.id, feed.id).await? {
        println!("Unfollowed '{}'.", feed.name);
    } else {
        println!("You were not following '{}'.", feed.name);
    }
    Ok(())
}

async fn agg(state: &State, interval: Duration) -> Result<()> {
    Aggregator::new(&state.repo, FeedFetcher::new())
        .run(interval)
        .await
}

async fn browse(state: &State, limit: Option<i64>) -> Result<()> {
    // Requires a login, but the listing itself is global: posts are not
    // filtered by the user's follows.
    require_user(state).await?;

    let limit = limit.unwrap_or(2);
    let posts = state.repo.get_recent_posts(limit).await?;

    println!("Showing {} posts:", posts.len());
    for post in posts {
        println!(" * {}", post.title);
        if let Some(published_at) = post.published_at {
            println!("   Published at: {published_at}");
        }
        if let Some(description) = post.description {
            println!("   {description}");
        }
        println!();
    }
    Ok(())
}
