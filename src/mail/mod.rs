//! Certificate delivery over SMTP.
//!
//! Every send first waits on the mailer's [`SendScheduler`], which keeps a
//! fixed minimum gap between consecutive messages so relays with daily quotas
//! are not flooded by a large batch.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::SmtpConfig;
use crate::storage::{file_name_of, StorageError};

/// Pause before the single retry of a transient SMTP failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email transport is not configured")]
    NotConfigured,
    #[error("participant email is missing")]
    MissingEmail,
    #[error("certificate PDF not generated yet")]
    NotGenerated,
    #[error("invalid email address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("invalid attachment content type: {0}")]
    AttachmentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Enforces a minimum interval between sends.
#[derive(Debug)]
pub struct SendScheduler {
    min_interval: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl SendScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: Mutex::new(None),
        }
    }

    /// Sleeps until the interval since the previous turn has passed, then
    /// claims the current instant. Returns how long it waited.
    pub async fn wait_turn(&self) -> Duration {
        // Held across the sleep so concurrent callers queue up.
        let mut last_send = self.last_send.lock().await;
        let mut waited = Duration::ZERO;
        if let Some(previous) = *last_send {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                waited = self.min_interval - elapsed;
                tracing::info!(wait_ms = waited.as_millis() as u64, "rate limiting email send");
                tokio::time::sleep(waited).await;
            }
        }
        *last_send = Some(Instant::now());
        waited
    }
}

/// Optional overrides for a certificate email.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOptions {
    pub subject: Option<String>,
    pub text: Option<String>,
    pub event_name: Option<String>,
}

/// A fully composed message, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateEmail {
    pub to: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub pdf: Vec<u8>,
}

pub fn default_subject(event_name: Option<&str>) -> String {
    match event_name.map(str::trim).filter(|e| !e.is_empty()) {
        Some(event) => format!("Your Certificate - {event}"),
        None => "Your Certificate".to_string(),
    }
}

pub fn default_body(recipient_name: &str) -> String {
    format!(
        "Hi {recipient_name},\n\nPlease find your certificate attached.\n\nRegards,\nCertificates Desk"
    )
}

impl CertificateEmail {
    /// Builds the email for a stored certificate. Fails without touching the
    /// transport when the address or the PDF is missing.
    pub fn compose(
        participant_id: i64,
        recipient_name: &str,
        email: Option<&str>,
        pdf_path: Option<&str>,
        pdf: Vec<u8>,
        options: &EmailOptions,
    ) -> Result<Self, MailError> {
        let to = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(MailError::MissingEmail)?;
        let pdf_path = pdf_path.filter(|p| !p.is_empty()).ok_or(MailError::NotGenerated)?;

        let attachment_name = file_name_of(pdf_path)
            .map(str::to_string)
            .unwrap_or_else(|| format!("certificate-{participant_id}.pdf"));

        Ok(Self {
            to: to.to_string(),
            recipient_name: recipient_name.to_string(),
            subject: options
                .subject
                .clone()
                .unwrap_or_else(|| default_subject(options.event_name.as_deref())),
            body: options
                .text
                .clone()
                .unwrap_or_else(|| default_body(recipient_name)),
            attachment_name,
            pdf,
        })
    }
}

/// Delivery seam used by certificate generation and resend.
pub trait CertificateMailer: Send + Sync {
    fn send(&self, email: CertificateEmail) -> impl Future<Output = Result<(), MailError>> + Send;
}

pub struct SmtpMailer {
    transport: Option<(AsyncSmtpTransport<Tokio1Executor>, Mailbox)>,
    scheduler: SendScheduler,
    retry_delay: Duration,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|source| MailError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}

impl SmtpMailer {
    /// Without SMTP settings every send fails with [`MailError::NotConfigured`].
    pub fn from_config(smtp: Option<&SmtpConfig>, min_interval: Duration) -> Result<Self, MailError> {
        let transport = match smtp {
            Some(smtp) => {
                let builder = if smtp.secure {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
                };
                let builder = builder.port(smtp.port);
                let builder = match (&smtp.user, &smtp.password) {
                    (Some(user), password) => builder.credentials(Credentials::new(
                        user.clone(),
                        password.clone().unwrap_or_default(),
                    )),
                    (None, _) => builder,
                };
                tracing::info!(host = %smtp.host, port = smtp.port, secure = smtp.secure, "SMTP transport configured");
                Some((builder.build(), parse_mailbox(&smtp.from)?))
            }
            None => {
                tracing::warn!("SMTP_HOST not set; certificate emails are disabled");
                None
            }
        };

        Ok(Self {
            transport,
            scheduler: SendScheduler::new(min_interval),
            retry_delay: RETRY_DELAY,
        })
    }

    fn build_message(from: &Mailbox, email: &CertificateEmail) -> Result<Message, MailError> {
        let to = parse_mailbox(&email.to)?;
        let pdf_type = ContentType::parse("application/pdf")?;
        let message = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(email.body.clone()))
                    .singlepart(
                        Attachment::new(email.attachment_name.clone())
                            .body(email.pdf.clone(), pdf_type),
                    ),
            )?;
        Ok(message)
    }
}

impl CertificateMailer for SmtpMailer {
    async fn send(&self, email: CertificateEmail) -> Result<(), MailError> {
        let (transport, from) = self.transport.as_ref().ok_or(MailError::NotConfigured)?;
        let message = Self::build_message(from, &email)?;

        self.scheduler.wait_turn().await;
        tracing::info!(to = %email.to, name = %email.recipient_name, "sending certificate email");

        match transport.send(message.clone()).await {
            Ok(response) => {
                tracing::info!(to = %email.to, code = %response.code(), "certificate email sent");
                Ok(())
            }
            Err(e) if e.is_transient() || e.is_timeout() => {
                tracing::warn!(to = %email.to, error = %e, retry_in_secs = self.retry_delay.as_secs(), "transient SMTP failure; retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.scheduler.wait_turn().await;
                transport.send(message).await?;
                tracing::info!(to = %email.to, "certificate email sent on retry");
                Ok(())
            }
            Err(e) => {
                tracing::error!(to = %email.to, error = %e, "failed to send certificate email");
                Err(e.into())
            }
        }
    }
}
