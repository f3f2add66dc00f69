//! Error types for the observatory client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Page scraping error: {0}")]
    Scrape(String),

    #[error("Timed out waiting for {what} after {secs} seconds")]
    Timeout { what: String, secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid coordinate: {0}")]
    Coordinate(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScopeError>;
