// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable mirror could be selected
    #[error("Could not acquire a mirror after {attempts} attempts")]
    MirrorUnavailable { attempts: u32 },

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },

    /// Upload target rejected a folder or file
    #[error("Upload error: {0}")]
    Upload(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an upload error.
    pub fn upload(message: impl fmt::Display) -> Self {
        Self::Upload(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io, AppError::Io(_)));

        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        assert!(matches!(AppError::from(toml_err), AppError::Toml(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(AppError::from(json_err), AppError::Json(_)));
    }

    #[test]
    fn test_display_carries_context() {
        let err = AppError::crawl("https://m.example/u/media", "HTTP 502");
        assert_eq!(
            err.to_string(),
            "Crawl error for https://m.example/u/media: HTTP 502"
        );
        assert_eq!(
            AppError::MirrorUnavailable { attempts: 50 }.to_string(),
            "Could not acquire a mirror after 50 attempts"
        );
    }
}
