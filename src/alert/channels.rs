//! Alert Channel Port (spec.md §4.5, §6): where a dispatched alert actually
//! goes. Modeled the same way as `MarketDataPort` — a narrow `#[async_trait]`
//! trait with a real transport (SMTP, via `lettre`, a SUPPLEMENT the teacher
//! has no analogue for) and an in-memory double for tests.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::alert::types::Alert;

#[async_trait]
pub trait AlertChannel: Send + Sync + 'static {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// SMTP alert channel. One notification email per dispatched alert, subject
/// keyed off the alert's kind and severity.
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl SmtpChannel {
    pub fn new(
        host: &str,
        username: &str,
        password: &str,
        from: String,
        to: String,
    ) -> anyhow::Result<Self> {
        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl AlertChannel for SmtpChannel {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let subject = format!("[gridcore:{:?}] {}", alert.severity, alert.dedup_key);
        let body = format!("{:#?}", alert.kind);

        let email = Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// In-memory channel used by tests and local/dev runs; records every alert
/// it was asked to send.
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    sent: Arc<Mutex<Vec<Alert>>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl AlertChannel for InMemoryChannel {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}
