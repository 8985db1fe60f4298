use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{Mail, MailSender};

/// Writes mails to the log instead of sending them. Keeps a copy of every
/// mail for inspection.
#[derive(Default)]
pub struct LogMailSender {
    sent: Mutex<Vec<Mail>>,
}

impl LogMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Mail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, email: &str) -> Vec<Mail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to_email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        tracing::info!(
            to = %mail.to_email,
            subject = %mail.subject,
            "Mail sent"
        );
        tracing::debug!(body = %mail.message, "Mail body");
        self.sent.lock().await.push(mail);
        Ok(())
    }
}
