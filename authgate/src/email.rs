//! Outbound email: the [`Mailer`] capability and its lettre-backed implementation.

use lettre::{
    Address, AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};
use std::path::Path;
use tracing::{info, instrument};

use crate::{
    config::{EmailConfig, EmailTransportConfig},
    errors::Error,
};

const USER_WELCOME_TEMPLATE: &str = include_str!("../templates/user_welcome.html");

/// A message template together with the variables it needs.
#[derive(Debug, Clone)]
pub enum EmailTemplate {
    /// Sent at registration, carries the activation link
    UserWelcome { username: String, activation_url: String },
}

impl EmailTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::UserWelcome { .. } => "user_welcome",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::UserWelcome { .. } => "Finish registration",
        }
    }

    /// Render the HTML body. Every variable is HTML-escaped.
    pub fn render(&self) -> Result<String, Error> {
        let mut env = Environment::new();
        // The `.html` suffix switches on minijinja's HTML auto-escaping
        let name = format!("{}.html", self.name());
        let source = match self {
            EmailTemplate::UserWelcome { .. } => USER_WELCOME_TEMPLATE,
        };
        env.add_template(&name, source).map_err(|e| Error::Internal {
            operation: format!("load email template {name}: {e}"),
        })?;

        let rendered = match self {
            EmailTemplate::UserWelcome { username, activation_url } => env
                .get_template(&name)
                .and_then(|template| template.render(context! { username, activation_url })),
        };
        rendered.map_err(|e| Error::Internal {
            operation: format!("render email template {name}: {e}"),
        })
    }
}

/// Who a message goes to
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

/// What the transport reported for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub transport: &'static str,
    /// SMTP reply code, if the transport has one
    pub status: Option<String>,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, template: &EmailTemplate, recipient: &Recipient) -> Result<Delivery, Error>;
}

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            reply_to: config.reply_to.clone(),
        })
    }

    fn build_message(&self, template: &EmailTemplate, recipient: &Recipient) -> Result<Message, Error> {
        let from_address = self.from_email.parse::<Address>().map_err(|e| Error::Internal {
            operation: format!("parse from email: {e}"),
        })?;
        let from = Mailbox::new(Some(self.from_name.clone()), from_address);

        // Display names are arbitrary user input; lettre quotes them when the header is written
        let address = recipient.email.parse::<Address>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;
        let to = Mailbox::new(recipient.name.clone(), address);

        let mut builder = Message::builder().from(from).to(to).subject(template.subject());
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(template.render()?)
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })
    }
}

#[async_trait::async_trait]
impl Mailer for EmailService {
    #[instrument(skip_all, fields(template = template.name()), err)]
    async fn send(&self, template: &EmailTemplate, recipient: &Recipient) -> Result<Delivery, Error> {
        let message = self.build_message(template, recipient)?;

        let delivery = match &self.transport {
            EmailTransport::Smtp(smtp) => {
                let response = smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
                Delivery {
                    transport: "smtp",
                    status: Some(response.code().to_string()),
                }
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
                Delivery {
                    transport: "file",
                    status: None,
                }
            }
        };

        info!(transport = delivery.transport, status = ?delivery.status, "Email sent");
        Ok(delivery)
    }
}
