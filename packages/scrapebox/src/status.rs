//! Status reporting to the hosting platform.
//!
//! Every guarded job run ends with exactly one status report: `ok` on
//! success, `error` with a short message on failure. The platform uses
//! these to badge the box's dataset page.

use async_trait::async_trait;

use crate::config::BoxConfig;
use crate::error::StatusError;

/// Outcome value the platform understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxStatus {
    Ok,
    Error,
}

impl BoxStatus {
    /// Wire value for the status API.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxStatus::Ok => "ok",
            BoxStatus::Error => "error",
        }
    }
}

/// Seam for reporting job status, so the guard is testable without the
/// platform.
#[async_trait]
pub trait StatusApi: Send + Sync {
    async fn report(&self, status: BoxStatus, message: &str) -> Result<(), StatusError>;
}

/// Reports status to the platform's status API over HTTP.
pub struct PlatformStatus {
    client: reqwest::Client,
    endpoint: String,
}

impl PlatformStatus {
    pub fn new(config: &BoxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.status_url(),
        }
    }
}

#[async_trait]
impl StatusApi for PlatformStatus {
    async fn report(&self, status: BoxStatus, message: &str) -> Result<(), StatusError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("type", status.as_str()), ("message", message)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StatusError::Platform {
                code: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_the_platform() {
        assert_eq!(BoxStatus::Ok.as_str(), "ok");
        assert_eq!(BoxStatus::Error.as_str(), "error");
    }
}
