// src/mailer.rs

use std::sync::OnceLock;

use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Writes outgoing mail to the log instead of delivering it. Reset tokens
/// never reach the log.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!("Mail to {}: {}", email.to, email.subject);
        debug!("{}", redact_reset_tokens(&email.html));
        Ok(())
    }
}

/// Replaces the token segment of every `/reset-password/<token>` link.
pub fn redact_reset_tokens(text: &str) -> String {
    static RESET_LINK: OnceLock<Regex> = OnceLock::new();
    RESET_LINK
        .get_or_init(|| Regex::new(r#"/reset-password/[^\s"'<>&]+"#).expect("static reset link pattern"))
        .replace_all(text, "/reset-password/[redacted]")
        .into_owned()
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn password_reset_email(to: &str, name: &str, reset_url: &str) -> Email {
    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h2>Password Reset Request</h2>\
         <p>Hi {name},</p>\
         <p>You requested a password reset. Click the link below to choose a new password:</p>\
         <p><a href=\"{url}\">Reset Password</a></p>\
         <p>This link expires in 10 minutes.</p>\
         <p>If you did not request this, you can ignore this email.</p>\
         </div>",
        name = escape_html(name),
        url = escape_html(reset_url),
    );
    Email {
        to: to.to_string(),
        subject: "Password Reset Request - TaskManager".to_string(),
        html,
    }
}
