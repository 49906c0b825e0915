//! Error types for Omnicast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmnicastError>;

#[derive(Error, Debug)]
pub enum OmnicastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider accepted the post but storing the record failed, so it
    /// is live without analytics tracking
    #[error("Published to {platform} as {platform_post_id}, but the post could not be recorded: {reason}")]
    Unrecorded {
        platform: String,
        platform_post_id: String,
        reason: String,
    },
}

impl OmnicastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnicastError::InvalidInput(_) => 3,
            OmnicastError::Unauthorized(_) => 2,
            OmnicastError::Platform(PlatformError::Authentication(_)) => 2,
            OmnicastError::Platform(_) => 1,
            OmnicastError::Config(_) => 1,
            OmnicastError::Database(_) => 1,
            OmnicastError::NotFound(_) => 1,
            OmnicastError::Unrecorded { .. } => 1,
        }
    }

    /// Whether the error means the OAuth application for a platform has no
    /// usable client credentials.
    pub fn is_not_configured(&self) -> bool {
        matches!(
            self,
            OmnicastError::Platform(PlatformError::NotConfigured(_)) | OmnicastError::Config(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt stored document: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Media processing failed: {0}")]
    MediaProcessing(String),

    #[error("OAuth not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = OmnicastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = OmnicastError::Platform(PlatformError::Authentication(
            "No stored credentials".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
        assert_eq!(OmnicastError::Unauthorized("no session".into()).exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let posting = OmnicastError::Platform(PlatformError::Posting("boom".to_string()));
        let config = OmnicastError::Config(ConfigError::MissingField("database.path".into()));
        let missing = OmnicastError::NotFound("post".into());
        assert_eq!(posting.exit_code(), 1);
        assert_eq!(config.exit_code(), 1);
        assert_eq!(missing.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = OmnicastError::Platform(PlatformError::MediaProcessing(
            "Instagram container ERROR".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Media processing failed: Instagram container ERROR"
        );

        let error = OmnicastError::InvalidInput("Content cannot be empty".to_string());
        assert_eq!(error.to_string(), "Invalid input: Content cannot be empty");
    }

    #[test]
    fn test_not_configured_detection() {
        let error: OmnicastError =
            PlatformError::NotConfigured("app/instagram".to_string()).into();
        assert!(error.is_not_configured());

        let error: OmnicastError = PlatformError::Network("timeout".to_string()).into();
        assert!(!error.is_not_configured());
    }

    #[test]
    fn test_unrecorded_names_the_live_post() {
        let error = OmnicastError::Unrecorded {
            platform: "facebook".to_string(),
            platform_post_id: "111_222".to_string(),
            reason: "database is locked".to_string(),
        };
        assert_eq!(error.exit_code(), 1);
        assert!(error.to_string().contains("facebook as 111_222"));
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "test",
        ));
        let error: OmnicastError = db_error.into();
        assert!(matches!(error, OmnicastError::Database(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::RateLimit("Too many calls".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
