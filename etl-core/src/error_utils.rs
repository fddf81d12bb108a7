use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Whether the job retries the failed operation by itself.
    fn is_retryable(&self) -> bool;
    /// Wait requested by the remote side before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!(code = %e.error_code(), "Reddit API failure: {:?}", e);
            }
            CoreError::Database(e) => {
                error!(code = %e.error_code(), "Database failure: {:?}", e);
            }
            CoreError::Config(e) => {
                error!(code = %e.error_code(), "Configuration failure: {:?}", e);
            }
            CoreError::Artifact(e) => {
                error!(code = %e.error_code(), "Artifact failure: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            // Loads and schema creation run once per job
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Artifact(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Could not reach Reddit or PostgreSQL over the network.".to_string()
            }
            CoreError::InvalidInput { .. } => {
                "The job was started with invalid arguments.".to_string()
            }
            CoreError::InvalidTransition { sector, .. } => {
                format!("Pipeline stages for '{}' ran out of order.", sector)
            }
            CoreError::PipelineFailed { failed_sectors } => format!(
                "The run finished with failures in: {}.",
                failed_sectors.join(", ")
            ),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Artifact(_) => "ARTIFACT".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION".to_string(),
            CoreError::PipelineFailed { .. } => "PIPELINE_FAILED".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { .. } => true,
            // Truncated listings show up as parse failures
            RedditApiError::InvalidResponse { .. } => true,
            // A rejected token is refreshed on the next attempt
            RedditApiError::InvalidToken => true,
            RedditApiError::AuthenticationFailed { .. }
            | RedditApiError::Forbidden { .. }
            | RedditApiError::PostNotFound { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit rejected the app credentials; check REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Reddit rate limit reached; requests resume in {}s.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => format!("Reddit refused access to {}.", resource),
            RedditApiError::PostNotFound { .. } => {
                "A post returned by search no longer exists.".to_string()
            }
            RedditApiError::InvalidToken => {
                "The Reddit access token expired or was revoked.".to_string()
            }
            RedditApiError::RequestTimeout => {
                "A Reddit request timed out.".to_string()
            }
            _ => "Reddit returned an unusable response.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::PostNotFound { .. } => "REDDIT_POST_NOT_FOUND".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => {
                "Could not connect to PostgreSQL; check the [database] settings.".to_string()
            }
            DatabaseError::SchemaFailed { sector, .. } => {
                format!("Could not prepare storage for sector '{}'.", sector)
            }
            DatabaseError::InsertFailed { post_id, .. } => {
                format!("Could not store post '{}'. Nothing was committed.", post_id)
            }
            _ => "A PostgreSQL statement failed; the load was rolled back.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::SchemaFailed { .. } => "DB_SCHEMA_FAILED".to_string(),
            DatabaseError::InsertFailed { .. } => "DB_INSERT_FAILED".to_string(),
            DatabaseError::TransactionFailed { .. } => "DB_TRANSACTION_FAILED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ArtifactError {
    fn log_error(&self) -> &Self {
        error!("ArtifactError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ArtifactError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ArtifactError::WriteFailed { path, .. } => {
                format!("Could not write {}. Check the artifact directory.", path)
            }
            ArtifactError::Csv(_) => "Could not encode the cleaned comments as CSV.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ArtifactError::WriteFailed { .. } => "ARTIFACT_WRITE_FAILED".to_string(),
            ArtifactError::Csv(_) => "ARTIFACT_CSV".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need operator intervention
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("No configuration file at '{}'.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Set '{}' in the configuration file.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("'{}' has an unusable value.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!("Export {} or set it in the configuration file.", var_name),
            _ => "The configuration could not be used as written.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!(
                code = %error.error_code(),
                retryable = error.is_retryable(),
                "{}",
                error.user_friendly_message()
            );
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
