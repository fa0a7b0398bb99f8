use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("failed to parse feed: {0}")]
    Parse(#[from] rss::Error),

    #[error("unknown timestamp format: {raw:?}")]
    UnknownTimestampFormat { raw: String },

    #[error("user '{0}' does not exist; register or log in first")]
    UserNotFound(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("no feed found with URL '{0}'; add it first with 'addfeed'")]
    FeedNotFound(String),

    #[error("no feeds in the database; add one with 'addfeed'")]
    NoFeeds,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
