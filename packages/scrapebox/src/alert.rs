//! Alert email composition and delivery.
//!
//! Alerts carry the box's full failure log so the recipient can read the
//! traceback without shelling into the box. Delivery goes through the
//! box's local SMTP relay; there is no retry or queueing here.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::BoxConfig;
use crate::error::AlertError;

/// A fully composed alert email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Compose the failure alert for a box: the dataset URL, a blank line,
/// then the raw log contents.
pub fn compose_alert(config: &BoxConfig, log_text: &str) -> AlertEmail {
    AlertEmail {
        to: config.recipient.clone(),
        from: config.sender(),
        subject: config.default_subject(),
        body: format!("{}\n\n{}", config.dataset_url(), log_text),
    }
}

/// Seam for delivering alerts, so the guard is testable without a relay.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &AlertEmail) -> Result<(), AlertError>;
}

/// Sends alerts through the box's local SMTP relay.
///
/// The relay speaks plain SMTP on the standard port with no TLS and no
/// authentication.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &BoxConfig) -> Self {
        Self {
            transport: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .build(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &AlertEmail) -> Result<(), AlertError> {
        let message = Message::builder()
            .from(email.from.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;

        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_leads_with_the_dataset_url() {
        let config = BoxConfig::new("reuben", "alerts@example.com");
        let email = compose_alert(&config, "ERROR something broke");

        assert_eq!(email.to, "alerts@example.com");
        assert_eq!(email.from, "reuben@scraperwiki.com");
        assert_eq!(email.subject, "scraping box reuben failed");
        assert_eq!(
            email.body,
            "https://scraperwiki.com/dataset/reuben\n\nERROR something broke"
        );
    }
}
