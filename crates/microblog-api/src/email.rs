//! Outgoing mail: password reset messages and admin alerts.

use async_trait::async_trait;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

use microblog_types::models::User;

use crate::config::{MailConfig, MailTransportConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

pub struct LettreMailer {
    transport: MailTransport,
    from: Mailbox,
}

enum MailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl LettreMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let transport = match &config.transport {
            MailTransportConfig::Smtp {
                host,
                port,
                use_tls,
                username,
                password,
            } => {
                if !use_tls {
                    warn!("SMTP TLS is disabled");
                }

                let mut builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                }
                .port(*port);

                if let (Some(user), Some(pass)) = (username, password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }

                MailTransport::Smtp(builder.build())
            }
            MailTransportConfig::File { dir } => {
                std::fs::create_dir_all(dir)?;
                info!("Mail will be written to {}", dir.display());
                MailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        Ok(Self {
            transport,
            from: config.sender.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(mail.subject);
        for to in &mail.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        let message = builder.multipart(MultiPart::alternative_plain_html(
            mail.text_body,
            mail.html_body,
        ))?;

        match &self.transport {
            MailTransport::Smtp(transport) => {
                transport.send(message).await?;
            }
            MailTransport::File(transport) => {
                transport.send(message).await?;
            }
        }
        Ok(())
    }
}

pub fn escape_html(raw: &str) -> String {
    minijinja::HtmlEscape(raw).to_string()
}

pub fn password_reset_mail(base_url: &str, user: &User, token: &str) -> OutgoingMail {
    let link = format!("{base_url}/reset_password/{token}");

    OutgoingMail {
        to: vec![user.email.clone()],
        subject: "[Microblog] Reset Your Password".to_string(),
        text_body: format!(
            "Dear {},\n\n\
             To reset your password click on the following link:\n\n\
             {link}\n\n\
             If you have not requested a password reset simply ignore this message.\n\n\
             Sincerely,\n\nThe Microblog Team\n",
            user.username
        ),
        html_body: format!(
            "<p>Dear {},</p>\
             <p>To reset your password <a href=\"{link}\">click here</a>.</p>\
             <p>Alternatively, you can paste the following link in your browser's address bar:</p>\
             <p>{link}</p>\
             <p>If you have not requested a password reset simply ignore this message.</p>\
             <p>Sincerely,</p><p>The Microblog Team</p>",
            escape_html(&user.username)
        ),
    }
}
