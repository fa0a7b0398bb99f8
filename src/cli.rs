use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gator")]
#[command(about = "A command-line RSS feed aggregator", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Register a new user and log in as them
    Register { name: String },

    /// Log in as an existing user
    Login { name: String },

    /// List all registered users
    Users,

    /// Delete all users, and with them all feeds, follows and posts
    Reset,

    /// List all feeds and who added them
    Feeds,

    /// Add a new feed and follow it
    Addfeed { name: String, url: String },

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List the feeds the current user follows
    Following,

    /// Unfollow a feed by URL
    Unfollow { url: String },

    /// Aggregate feeds until terminated, one feed per interval
    Agg {
        /// Time between fetches, e.g. 30m or 1h
        #[arg(value_parser = humantime::parse_duration)]
        interval: Duration,
    },

    /// Show the most recently published posts
    Browse {
        /// Maximum number of posts to show
        limit: Option<i64>,
    },
}
