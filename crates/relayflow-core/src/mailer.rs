//! SMTP client
//!
//! Builds MIME messages and dials relays according to their stored
//! encryption and auth settings. The send and probe seams are traits so
//! the worker pool and health controller can be tested without a
//! network.

use crate::queue::EmailTask;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use relayflow_common::types::TlsMode;
use relayflow_common::{Error, Result};
use relayflow_storage::models::SmtpRelay;
use std::time::Duration;

/// Deadline for one delivery attempt
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Subject line of the self-addressed probe message
const PROBE_SUBJECT: &str = "health check";

/// Delivery seam used by the worker pool
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, relay: &SmtpRelay, recipient: &str, task: &EmailTask) -> Result<()>;
}

/// Probe seam used by the health controller and the relay test endpoint
#[async_trait]
pub trait RelayProbe: Send + Sync {
    async fn probe(&self, relay: &SmtpRelay) -> Result<()>;
}

/// lettre-backed SMTP client
#[derive(Default)]
pub struct Mailer;

impl Mailer {
    pub fn new() -> Self {
        Self
    }
}

fn sender_mailbox(relay: &SmtpRelay) -> Result<Mailbox> {
    let address: Address = relay
        .from_email
        .parse()
        .map_err(|e| Error::Smtp(format!("Invalid from address: {}", e)))?;
    let name = if relay.from_name.is_empty() {
        None
    } else {
        Some(relay.from_name.clone())
    };
    Ok(Mailbox::new(name, address))
}

/// Build the MIME message for one recipient.
///
/// An HTML body is primary; a text body alongside it becomes the
/// `text/plain` alternative. Without HTML the message is plain text.
fn build_message(relay: &SmtpRelay, recipient: &str, task: &EmailTask) -> Result<Message> {
    let to: Mailbox = recipient
        .parse()
        .map_err(|e| Error::Smtp(format!("Invalid recipient address: {}", e)))?;

    let builder = Message::builder()
        .from(sender_mailbox(relay)?)
        .to(to)
        .subject(&task.subject);

    let html = task.html.as_deref().filter(|s| !s.is_empty());
    let text = task.text.as_deref().filter(|s| !s.is_empty());

    let message = match (html, text) {
        (Some(html), Some(text)) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.to_string()))
                .singlepart(SinglePart::html(html.to_string())),
        ),
        (Some(html), None) => builder
            .header(ContentType::TEXT_HTML)
            .body(html.to_string()),
        (None, text) => builder
            .header(ContentType::TEXT_PLAIN)
            .body(text.unwrap_or_default().to_string()),
    };

    message.map_err(|e| Error::Smtp(format!("Failed to build message: {}", e)))
}

fn build_transport(relay: &SmtpRelay) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let mut builder = match TlsMode::from_encryption(&relay.encryption) {
        TlsMode::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&relay.host)
            .map_err(|e| Error::Smtp(format!("Failed to build TLS transport: {}", e)))?,
        TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&relay.host)
            .map_err(|e| Error::Smtp(format!("Failed to build STARTTLS transport: {}", e)))?,
        TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&relay.host),
    };

    builder = builder
        .port(relay.port as u16)
        .timeout(Some(SEND_TIMEOUT));

    if !relay.username.is_empty() {
        builder = builder.credentials(Credentials::new(
            relay.username.clone(),
            relay.password.clone(),
        ));
        if matches!(relay.auth_method.as_str(), "xoauth2" | "oauth2") {
            // credential carries the bearer token
            builder = builder.authentication(vec![Mechanism::Xoauth2]);
        }
    }

    Ok(builder.build())
}

#[async_trait]
impl MailTransport for Mailer {
    async fn send(&self, relay: &SmtpRelay, recipient: &str, task: &EmailTask) -> Result<()> {
        let message = build_message(relay, recipient, task)?;
        let transport = build_transport(relay)?;
        transport
            .send(message)
            .await
            .map_err(|e| Error::Smtp(format!("Send via {} failed: {}", relay.host, e)))?;
        Ok(())
    }
}

#[async_trait]
impl RelayProbe for Mailer {
    async fn probe(&self, relay: &SmtpRelay) -> Result<()> {
        let to: Mailbox = relay
            .from_email
            .parse()
            .map_err(|e| Error::Smtp(format!("Invalid from address: {}", e)))?;

        let message = Message::builder()
            .from(sender_mailbox(relay)?)
            .to(to)
            .subject(PROBE_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body("This is an automated relay health check.".to_string())
            .map_err(|e| Error::Smtp(format!("Failed to build probe message: {}", e)))?;

        let transport = build_transport(relay)?;
        transport
            .send(message)
            .await
            .map_err(|e| Error::Smtp(format!("Probe of {} failed: {}", relay.host, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::relay_fixture;

    fn task(html: Option<&str>, text: Option<&str>) -> EmailTask {
        EmailTask {
            tenant_id: 1,
            to: vec!["x@y.example".to_string()],
            subject: "greetings".to_string(),
            html: html.map(str::to_string),
            text: text.map(str::to_string),
        }
    }

    fn formatted(message: Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn html_with_text_builds_an_alternative() {
        let relay = relay_fixture(1, 10, 100);
        let message = build_message(&relay, "x@y.example", &task(Some("<b>hi</b>"), Some("hi")))
            .unwrap();
        let raw = formatted(message);
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn html_only_is_a_single_html_part() {
        let relay = relay_fixture(1, 10, 100);
        let message =
            build_message(&relay, "x@y.example", &task(Some("<b>hi</b>"), None)).unwrap();
        let raw = formatted(message);
        assert!(raw.contains("text/html"));
        assert!(!raw.contains("multipart/alternative"));
    }

    #[test]
    fn text_only_is_plain() {
        let relay = relay_fixture(1, 10, 100);
        let message = build_message(&relay, "x@y.example", &task(None, Some("hi"))).unwrap();
        let raw = formatted(message);
        assert!(raw.contains("text/plain"));
        assert!(!raw.contains("text/html"));
    }

    #[test]
    fn from_header_carries_the_display_name() {
        let mut relay = relay_fixture(1, 10, 100);
        relay.from_name = "Relay Flow".to_string();
        let message = build_message(&relay, "x@y.example", &task(None, Some("hi"))).unwrap();
        let raw = formatted(message);
        assert!(raw.contains("\"Relay Flow\" <noreply@example.com>"));
    }

    #[test]
    fn bad_recipient_is_an_error() {
        let relay = relay_fixture(1, 10, 100);
        assert!(build_message(&relay, "not-an-address", &task(None, Some("hi"))).is_err());
    }
}
