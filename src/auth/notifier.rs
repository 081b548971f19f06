//! Out-of-band delivery of action links.
//!
//! The lifecycle manager only needs a [`Notifier`]. The default implementation,
//! [`EmailNotifier`], renders the verification and reset messages and hands them
//! to an [`EmailSender`], which decides how to deliver (SMTP, API, etc.).
//! [`LogEmailSender`] logs the message instead of sending it and is what local
//! runs use.

use anyhow::anyhow;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use super::account::ActionPurpose;
use super::utils::valid_email;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid recipient email address")]
    InvalidRecipient,
    #[error("notification delivery failed")]
    Delivery(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl NotifyError {
    pub fn delivery(err: anyhow::Error) -> Self {
        Self::Delivery(err.into())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification(&self, email: &str, link: &str) -> Result<(), NotifyError>;
    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), NotifyError>;
}

/// Run a notifier call with an upper bound; elapsing is reported, not swallowed.
///
/// # Errors
/// [`NotifyError::Timeout`] when `limit` elapses first, otherwise whatever `call` returns.
pub async fn bounded<F>(limit: Duration, call: F) -> Result<(), NotifyError>
where
    F: Future<Output = Result<(), NotifyError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| NotifyError::Timeout(limit))?
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: &'static str,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction used by [`EmailNotifier`].
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it was not sent.
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Renders lifecycle emails and delivers them through an [`EmailSender`].
#[derive(Clone)]
pub struct EmailNotifier {
    sender: Arc<dyn EmailSender>,
    product_name: String,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("product_name", &self.product_name)
            .finish_non_exhaustive()
    }
}

impl EmailNotifier {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>, product_name: String) -> Self {
        Self {
            sender,
            product_name,
        }
    }

    #[must_use]
    pub fn render(&self, purpose: ActionPurpose, to_email: &str, link: &str) -> EmailMessage {
        let product = &self.product_name;
        let (subject, html_body) = match purpose {
            ActionPurpose::VerifyEmail => (
                "Verify Your Email Address".to_string(),
                format!(
                    "<html><body>\
                     <h2>Welcome to {product}!</h2>\
                     <p>Please click the link below to verify your email address:</p>\
                     <p><a href=\"{link}\">Verify Email</a></p>\
                     <p>If you didn't request this, please ignore this email.</p>\
                     <hr><small>This link will expire in 24 hours.</small>\
                     </body></html>"
                ),
            ),
            ActionPurpose::ResetPassword => (
                "Password Reset Request".to_string(),
                format!(
                    "<html><body>\
                     <h2>Password Reset</h2>\
                     <p>You requested a password reset. \
                     Click the link below to reset your password:</p>\
                     <p><a href=\"{link}\">Reset Password</a></p>\
                     <p>This link will expire in 15 minutes.</p>\
                     <p>If you didn't request this, please secure your account.</p>\
                     <hr><small>{product} Security Team</small>\
                     </body></html>"
                ),
            ),
        };

        EmailMessage {
            to_email: to_email.to_string(),
            template: purpose.as_str(),
            subject,
            html_body,
        }
    }

    async fn deliver(
        &self,
        purpose: ActionPurpose,
        email: &str,
        link: &str,
    ) -> Result<(), NotifyError> {
        if !valid_email(email) {
            return Err(NotifyError::InvalidRecipient);
        }
        let message = self.render(purpose, email, link);
        self.sender
            .send(&message)
            .await
            .map_err(NotifyError::delivery)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_verification(&self, email: &str, link: &str) -> Result<(), NotifyError> {
        self.deliver(ActionPurpose::VerifyEmail, email, link).await
    }

    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), NotifyError> {
        self.deliver(ActionPurpose::ResetPassword, email, link).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentLink {
    pub purpose: ActionPurpose,
    pub email: String,
    pub link: String,
}

impl SentLink {
    /// The `token` query parameter of the link.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        url::Url::parse(&self.link).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        })
    }
}

/// Notifier that keeps every link in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentLink>>,
    fail: bool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<SentLink> {
        self.sent.lock().await.clone()
    }

    /// Most recent link of `purpose` sent to `email`.
    pub async fn last(&self, purpose: ActionPurpose, email: &str) -> Option<SentLink> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|sent| sent.purpose == purpose && sent.email == email)
            .cloned()
    }

    async fn record(
        &self,
        purpose: ActionPurpose,
        email: &str,
        link: &str,
    ) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::delivery(anyhow!("recording notifier set to fail")));
        }
        self.sent.lock().await.push(SentLink {
            purpose,
            email: email.to_string(),
            link: link.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_verification(&self, email: &str, link: &str) -> Result<(), NotifyError> {
        self.record(ActionPurpose::VerifyEmail, email, link).await
    }

    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), NotifyError> {
        self.record(ActionPurpose::ResetPassword, email, link).await
    }
}
