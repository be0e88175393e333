//! Email delivery contract.
//!
//! Transactional mail is an external collaborator; the core only knows this
//! trait. Sends are fire-and-log: a delivery failure never fails the flow
//! that triggered it.

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use crate::config::Config;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error; callers only log failures.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

fn send_logged(sender: &dyn EmailSender, message: &EmailMessage) {
    if let Err(err) = sender.send(message) {
        error!(
            template = %message.template,
            "email delivery failed: {err:#}"
        );
    }
}

pub fn send_welcome(sender: &dyn EmailSender, config: &Config, to_email: &str, name: &str) {
    let payload = json!({
        "name": name,
        "from": config.email_from(),
        "fromName": config.email_from_name(),
    });
    send_logged(
        sender,
        &EmailMessage {
            to_email: to_email.to_string(),
            template: "welcome".to_string(),
            payload_json: payload.to_string(),
        },
    );
}

pub fn send_password_reset(
    sender: &dyn EmailSender,
    config: &Config,
    to_email: &str,
    reset_url: &str,
) {
    let payload = json!({
        "resetUrl": reset_url,
        "from": config.email_from(),
        "fromName": config.email_from_name(),
    });
    send_logged(
        sender,
        &EmailMessage {
            to_email: to_email.to_string(),
            template: "password_reset".to_string(),
            payload_json: payload.to_string(),
        },
    );
}
