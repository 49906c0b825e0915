//! Status polling for asynchronously processed media
//!
//! Instagram (and similar APIs) process uploaded media in a "container"
//! that must reach `FINISHED` before it can be published. The container is
//! checked at a fixed interval for a bounded number of attempts.

use std::future::Future;
use std::time::Duration;

use crate::config::PublishingConfig;
use crate::error::{OmnicastError, PlatformError, Result};

/// Processing state reported for a media container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    Published,
    Error(String),
    Expired,
}

impl ContainerStatus {
    /// Parse a provider `status_code`, with the optional `status` detail
    pub fn parse(code: &str, detail: Option<&str>) -> Self {
        match code.to_uppercase().as_str() {
            "FINISHED" => Self::Finished,
            "PUBLISHED" => Self::Published,
            "EXPIRED" => Self::Expired,
            "ERROR" => Self::Error(detail.unwrap_or("processing error").to_string()),
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

impl From<&PublishingConfig> for PollPolicy {
    fn from(config: &PublishingConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts.max(1),
        }
    }
}

fn is_transient(error: &OmnicastError) -> bool {
    matches!(
        error,
        OmnicastError::Platform(PlatformError::Network(_) | PlatformError::RateLimit(_))
    )
}

/// Wait for a container to finish processing.
///
/// Each attempt waits `interval` and then runs `check` once. `FINISHED`
/// returns immediately; `ERROR` and `EXPIRED` fail without further checks.
/// A transient error from `check` uses up the attempt and polling carries
/// on; any other error is returned as is. When `max_attempts` checks pass
/// without a terminal status the container is reported as stuck.
pub async fn poll_container<F, Fut>(policy: PollPolicy, label: &str, mut check: F) -> Result<()>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ContainerStatus>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        match check(attempt).await {
            Ok(ContainerStatus::Finished) | Ok(ContainerStatus::Published) => {
                tracing::debug!("{} ready after {} status checks", label, attempt);
                return Ok(());
            }
            Ok(ContainerStatus::Error(detail)) => {
                return Err(PlatformError::MediaProcessing(format!(
                    "{} failed processing: {}",
                    label, detail
                ))
                .into());
            }
            Ok(ContainerStatus::Expired) => {
                return Err(PlatformError::MediaProcessing(format!(
                    "{} expired before it could be published",
                    label
                ))
                .into());
            }
            Ok(ContainerStatus::InProgress) => {
                tracing::debug!(
                    "{} still processing ({}/{})",
                    label,
                    attempt,
                    policy.max_attempts
                );
            }
            Err(e) if is_transient(&e) => {
                tracing::warn!(
                    "{} status check {}/{} failed: {}",
                    label,
                    attempt,
                    policy.max_attempts,
                    e
                );
            }
            Err(e) => return Err(e),
        }
    }

    Err(PlatformError::MediaProcessing(format!(
        "{} did not finish processing after {} status checks",
        label, policy.max_attempts
    ))
    .into())
}
