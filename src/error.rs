//! Error types and result handling for yomikomi operations.
//!
//! Every fallible operation returns a [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **Transport**: connection failures, HTTP status errors, throttling. These
//!   are the only retryable errors, see [`Error::is_retryable`].
//! - **Layout changes**: a listing page matched none of the configured
//!   selectors and carried no explicit "no results" marker.
//! - **Parse / JSON**: documents that could not be read at all.
//! - **Configuration**: malformed site configuration records.
//!
//! Missing individual fields are not errors. They are recovered locally as
//! `None`, an empty string or an unknown rating.
//!
//! # Examples
//!
//! ```rust
//! use yomikomi::Error;
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err {
//!         Error::LayoutChanged { .. } => "selectors need updating",
//!         e if e.is_retryable() => "try again later",
//!         _ => "permanent failure",
//!     }
//! }
//! ```

use thiserror::Error;

/// Type alias for Results with yomikomi errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all yomikomi operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors from the HTTP client.
    ///
    /// Connection timeouts, DNS resolution failures, TLS errors and body
    /// read failures all end up here.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A site answered with a non-success HTTP status.
    #[error("HTTP {status} from [{src}]")]
    Http { src: String, status: u16 },

    /// The site throttled the request.
    ///
    /// `retry_after` carries the `Retry-After` header in seconds when present.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    /// A listing page produced no items and no explicit end-of-results
    /// signal. The site layout most likely changed.
    #[error("Layout changed [{src}]: no items matched at {url}")]
    LayoutChanged { src: String, url: String },

    /// Documents that could not be parsed at all.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid site configuration: TOML syntax, selectors, patterns or
    /// templates that cannot be used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// File system errors, raised when loading configuration files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error messages.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a parse error with the given message.
    ///
    /// ```rust
    /// use yomikomi::Error;
    ///
    /// let error = Error::parse("Invalid UTF-8 in response body");
    /// ```
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a not found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a rate limit error with optional retry-after time.
    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        Error::RateLimit { retry_after }
    }

    /// Creates a layout-changed error for a listing URL.
    pub fn layout_changed(src: impl Into<String>, url: impl Into<String>) -> Self {
        Error::LayoutChanged {
            src: src.into(),
            url: url.into(),
        }
    }

    /// Returns `true` when repeating the same request may succeed.
    ///
    /// Transport failures, throttling and server-side (5xx) statuses are
    /// retryable. Client errors, layout changes and parse failures are not.
    ///
    /// ```rust
    /// use yomikomi::Error;
    ///
    /// assert!(Error::rate_limit(Some(5)).is_retryable());
    /// assert!(Error::Http { src: "x".into(), status: 503 }.is_retryable());
    /// assert!(!Error::Http { src: "x".into(), status: 404 }.is_retryable());
    /// assert!(!Error::layout_changed("x", "https://x/").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::RateLimit { .. } => true,
            Error::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(err.to_string())
    }
}
