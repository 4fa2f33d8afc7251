use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify channel secret missing: {0}")]
    Config(#[from] rowvault_config::ConfigError),

    #[error("webhook request to {url} failed: {source}")]
    Webhook { url: String, #[source] source: reqwest::Error },

    #[error("webhook to {url} returned status {status}")]
    WebhookStatus { url: String, status: reqwest::StatusCode },

    #[error("smtp transport build failed: {0}")]
    SmtpTransport(String),

    #[error("email message build failed: {0}")]
    MessageBuild(String),

    #[error("email delivery failed: {0}")]
    SmtpSend(String),
}
