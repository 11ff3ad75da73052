use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound mail capability. Delivery is always best-effort from the core's
/// perspective; callers log failures rather than propagating them.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Default transport: records the send instead of speaking SMTP.
/// Deployments wire a real transport behind the same trait.
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!("mail to {}: {}", email.to, email.subject);
        Ok(())
    }
}
