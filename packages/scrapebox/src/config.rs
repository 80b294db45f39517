//! Box-level configuration sourced from the environment.

use std::env;
use std::path::PathBuf;

use chrono::NaiveTime;

/// Configuration for one scraping box.
///
/// Everything the guard, the alert mailer, the status client, and the
/// scheduler need to know about the box they run on.
#[derive(Debug, Clone)]
pub struct BoxConfig {
    /// Box owner, normally the `USER` environment variable
    pub user: String,
    /// Where failure alerts go
    pub recipient: String,
    /// File-backed failure log; its full contents ride along in alerts
    pub logfile: PathBuf,
    /// Local SMTP relay host
    pub smtp_host: String,
    /// Base URL of the hosting platform (status API, dataset pages)
    pub platform_url: String,
    /// Time of day scheduled jobs fire
    pub schedule_at: NaiveTime,
}

impl BoxConfig {
    /// Build a config for the current box, reading `USER` from the
    /// environment (and `.env`, if present).
    pub fn from_env(recipient: impl Into<String>) -> Self {
        dotenvy::dotenv().ok();
        let user = env::var("USER").unwrap_or_default();
        Self::new(user, recipient)
    }

    /// Build a config with explicit box owner and alert recipient.
    pub fn new(user: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            recipient: recipient.into(),
            logfile: PathBuf::from("log.txt"),
            smtp_host: "localhost".to_string(),
            platform_url: "https://scraperwiki.com".to_string(),
            schedule_at: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        }
    }

    pub fn with_logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = path.into();
        self
    }

    pub fn with_smtp_host(mut self, host: impl Into<String>) -> Self {
        self.smtp_host = host.into();
        self
    }

    pub fn with_platform_url(mut self, url: impl Into<String>) -> Self {
        self.platform_url = url.into();
        self
    }

    pub fn with_schedule_at(mut self, at: NaiveTime) -> Self {
        self.schedule_at = at;
        self
    }

    /// URL of the box's dataset page, shown at the top of alert emails.
    pub fn dataset_url(&self) -> String {
        format!("{}/dataset/{}", self.platform_base(), self.user)
    }

    /// Endpoint status reports are POSTed to.
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.platform_base())
    }

    /// Sender address for alert emails.
    pub fn sender(&self) -> String {
        format!("{}@{}", self.user, self.platform_host())
    }

    /// Default subject line for alert emails.
    pub fn default_subject(&self) -> String {
        format!("scraping box {} failed", self.user)
    }

    fn platform_base(&self) -> &str {
        self.platform_url.trim_end_matches('/')
    }

    fn platform_host(&self) -> &str {
        self.platform_base()
            .rsplit('/')
            .next()
            .unwrap_or(self.platform_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BoxConfig {
        BoxConfig::new("reuben", "alerts@example.com")
    }

    #[test]
    fn defaults_match_box_conventions() {
        let config = config();
        assert_eq!(config.logfile, PathBuf::from("log.txt"));
        assert_eq!(config.smtp_host, "localhost");
        assert_eq!(config.schedule_at, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
    }

    #[test]
    fn dataset_url_embeds_the_user() {
        assert_eq!(
            config().dataset_url(),
            "https://scraperwiki.com/dataset/reuben"
        );
    }

    #[test]
    fn sender_uses_platform_host() {
        assert_eq!(config().sender(), "reuben@scraperwiki.com");
    }

    #[test]
    fn subject_names_the_box() {
        assert_eq!(config().default_subject(), "scraping box reuben failed");
    }

    #[test]
    fn trailing_slash_on_platform_url_is_tolerated() {
        let config = config().with_platform_url("https://boxes.example.org/");
        assert_eq!(config.status_url(), "https://boxes.example.org/api/status");
        assert_eq!(config.sender(), "reuben@boxes.example.org");
    }
}
