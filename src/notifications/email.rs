//! SMTP delivery for booking and contact notifications.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{BookingEmail, ContactEmail, Notifier};
use crate::config::EmailConfig;

pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Agency inbox; falls back to the sender address
    fn admin_address(&self) -> Result<&str> {
        self.config
            .admin_address
            .as_deref()
            .or(self.config.from_address.as_deref())
            .ok_or_else(|| anyhow::anyhow!("No admin address configured"))
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        reply_to: Option<&str>,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let mut builder = Message::builder().from(from).to(to).subject(subject);
        if let Some(reply_to) = reply_to {
            builder = builder.reply_to(reply_to.parse()?);
        }

        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body.to_string()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body.to_string()),
                ),
        )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port)
        .timeout(Some(std::time::Duration::from_secs(
            self.config.send_timeout_secs,
        )));

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_booking_confirmation_email(&self, booking: &BookingEmail) -> Result<()> {
        let subject = if booking.meeting_link.is_some() {
            format!("Your {} consultation is confirmed", booking.service_name)
        } else {
            format!("We received your {} booking", booking.service_name)
        };
        self.send_email(
            &booking.client_email,
            None,
            &subject,
            &render_booking_html(booking, BookingAudience::Client),
            &render_booking_text(booking, BookingAudience::Client),
        )
        .await
    }

    async fn send_service_booking_email(&self, booking: &BookingEmail) -> Result<()> {
        let to = self.admin_address()?;
        let subject = format!(
            "New booking: {} on {} at {}",
            booking.service_name, booking.booking_date, booking.preferred_time
        );
        self.send_email(
            to,
            Some(&booking.client_email),
            &subject,
            &render_booking_html(booking, BookingAudience::Admin),
            &render_booking_text(booking, BookingAudience::Admin),
        )
        .await
    }

    async fn send_contact_email(&self, contact: &ContactEmail) -> Result<()> {
        let to = self.admin_address()?;
        let subject = format!(
            "Contact form: {}",
            contact.subject.as_deref().unwrap_or("New message")
        );
        self.send_email(
            to,
            Some(&contact.email),
            &subject,
            &render_contact_html(contact),
            &render_contact_text(contact),
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookingAudience {
    Client,
    Admin,
}

fn booking_rows(booking: &BookingEmail) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Service", booking.service_name.clone()),
        ("Date", booking.booking_date.clone()),
        ("Time", format!("{} ({})", booking.preferred_time, booking.timezone)),
        ("Duration", format!("{} minutes", booking.duration)),
        ("Name", booking.client_name.clone()),
        ("Email", booking.client_email.clone()),
    ];
    if let Some(phone) = &booking.client_phone {
        rows.push(("Phone", phone.clone()));
    }
    if let Some(company) = &booking.company {
        rows.push(("Company", company.clone()));
    }
    if let Some(link) = &booking.meeting_link {
        rows.push(("Meeting link", link.clone()));
    }
    rows
}

fn booking_intro(booking: &BookingEmail, audience: BookingAudience) -> String {
    match (audience, booking.meeting_link.is_some()) {
        (BookingAudience::Admin, _) => format!(
            "{} booked a {} consultation.",
            booking.client_name, booking.service_name
        ),
        (BookingAudience::Client, true) => format!(
            "Hi {}, your consultation is confirmed. Use the meeting link below to join.",
            booking.client_name
        ),
        (BookingAudience::Client, false) => format!(
            "Hi {}, thanks for booking. We will confirm your slot shortly.",
            booking.client_name
        ),
    }
}

fn render_booking_html(booking: &BookingEmail, audience: BookingAudience) -> String {
    let rows: String = booking_rows(booking)
        .into_iter()
        .map(|(label, value)| {
            format!(
                "<tr><td style=\"color:#6b7280;padding:6px 12px 6px 0\">{}</td><td style=\"color:#111827\">{}</td></tr>",
                label,
                html_escape(&value)
            )
        })
        .collect();

    let message = match (&booking.message, audience) {
        (Some(message), BookingAudience::Admin) => {
            format!("<p><strong>Message</strong></p><p>{}</p>", html_escape(message))
        }
        _ => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Booking</title></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background:#f5f5f5; margin:0; padding:40px 20px">
  <div style="max-width:560px; margin:0 auto; background:#ffffff; border-radius:8px; padding:32px 24px">
    <p>{intro}</p>
    <table>{rows}</table>
    {message}
    <p style="color:#9ca3af; font-size:12px">Reference: {booking_id}</p>
  </div>
</body>
</html>"#,
        intro = html_escape(&booking_intro(booking, audience)),
        rows = rows,
        message = message,
        booking_id = html_escape(&booking.booking_id),
    )
}

fn render_booking_text(booking: &BookingEmail, audience: BookingAudience) -> String {
    let mut text = booking_intro(booking, audience);
    text.push_str("\n\n");
    for (label, value) in booking_rows(booking) {
        text.push_str(&format!("{}: {}\n", label, value));
    }
    if audience == BookingAudience::Admin {
        if let Some(message) = &booking.message {
            text.push_str(&format!("\nMessage:\n{}\n", message));
        }
    }
    text.push_str(&format!("\nReference: {}", booking.booking_id));
    text
}

fn render_contact_html(contact: &ContactEmail) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Contact</title></head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif">
  <p><strong>{name}</strong> &lt;{email}&gt; wrote:</p>
  <p><em>{subject}</em></p>
  <p style="white-space:pre-wrap">{message}</p>
</body>
</html>"#,
        name = html_escape(&contact.name),
        email = html_escape(&contact.email),
        subject = html_escape(contact.subject.as_deref().unwrap_or("(no subject)")),
        message = html_escape(&contact.message),
    )
}

fn render_contact_text(contact: &ContactEmail) -> String {
    format!(
        "{} <{}> wrote:\n\nSubject: {}\n\n{}",
        contact.name,
        contact.email,
        contact.subject.as_deref().unwrap_or("(no subject)"),
        contact.message
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> BookingEmail {
        BookingEmail {
            booking_id: "b-1".into(),
            service_name: "Web Development".into(),
            client_name: "Ada <script>".into(),
            client_email: "ada@example.com".into(),
            client_phone: None,
            company: Some("Acme & Co".into()),
            booking_date: "2025-06-01".into(),
            preferred_time: "10:00 AM".into(),
            timezone: "UTC".into(),
            duration: 30,
            message: Some("Need a storefront".into()),
            meeting_link: None,
            notes: None,
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(html_escape("\"quoted\""), "&quot;quoted&quot;");
    }

    #[test]
    fn test_booking_html_escapes_client_input() {
        let html = render_booking_html(&booking(), BookingAudience::Admin);
        assert!(html.contains("Ada &lt;script&gt;"));
        assert!(html.contains("Acme &amp; Co"));
        assert!(html.contains("Need a storefront"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_client_text_omits_message_and_mentions_confirmation() {
        let mut b = booking();
        let pending = render_booking_text(&b, BookingAudience::Client);
        assert!(pending.contains("We will confirm"));
        assert!(!pending.contains("Need a storefront"));

        b.meeting_link = Some("https://meet.example.com/x".into());
        let confirmed = render_booking_text(&b, BookingAudience::Client);
        assert!(confirmed.contains("confirmed"));
        assert!(confirmed.contains("https://meet.example.com/x"));
        assert!(confirmed.contains("10:00 AM (UTC)"));
    }

    #[test]
    fn test_render_contact_text() {
        let text = render_contact_text(&ContactEmail {
            name: "Grace".into(),
            email: "grace@example.com".into(),
            subject: None,
            message: "Hello there".into(),
        });
        assert!(text.contains("Grace <grace@example.com>"));
        assert!(text.contains("(no subject)"));
        assert!(text.contains("Hello there"));
    }

    #[tokio::test]
    async fn test_admin_notice_requires_an_inbox() {
        let notifier = SmtpNotifier::new(EmailConfig::default());
        assert!(notifier
            .send_service_booking_email(&booking())
            .await
            .is_err());
    }
}
