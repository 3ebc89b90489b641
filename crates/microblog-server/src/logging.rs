use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

use microblog_api::config::Config;
use microblog_api::email::{Mailer, OutgoingMail};

const DEFAULT_FILTER: &str = "microblog=info,microblog_api=info,microblog_db=info,tower_http=info";
const LOG_FILE_PREFIX: &str = "microblog.log";
const LOG_FILES_KEPT: usize = 30;
const ALERT_QUEUE: usize = 64;
const ALERT_SUBJECT: &str = "Microblog Failure";

/// Console logging always. In production also a daily rotated log file and,
/// when a mail server and admins are configured, error mails.
pub fn init(config: &Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let file_layer = if config.production {
        Some(
            tfmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(file_appender(&config.log_dir)?),
        )
    } else {
        None
    };

    let alert_layer = config
        .admin_alerts_enabled()
        .then(|| spawn_alert_forwarder(mailer, config.admins.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tfmt::layer())
        .with(file_layer)
        .with(alert_layer)
        .try_init()?;

    Ok(())
}

/// Rolls over at midnight UTC and keeps the last 30 files.
fn file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(LOG_FILES_KEPT)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub target: String,
    pub location: String,
    pub message: String,
    pub fields: Vec<String>,
}

/// Forwards ERROR events to a channel. Never blocks: when the queue is
/// full the alert is dropped.
pub struct AlertLayer {
    tx: mpsc::Sender<Alert>,
}

impl AlertLayer {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() != Level::ERROR {
            return;
        }

        let mut visitor = AlertVisitor::default();
        event.record(&mut visitor);

        let alert = Alert {
            target: meta.target().to_string(),
            location: format!(
                "{}:{}",
                meta.file().unwrap_or("<unknown>"),
                meta.line().unwrap_or(0)
            ),
            message: visitor.message,
            fields: visitor.fields,
        };
        let _ = self.tx.try_send(alert);
    }
}

#[derive(Default)]
struct AlertVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for AlertVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{} = {}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{} = {:?}", field.name(), value));
        }
    }
}

pub fn alert_mail(alert: &Alert, admins: &[String]) -> OutgoingMail {
    let mut text = format!(
        "{}\n\nTarget: {}\nLocation: {}\n",
        alert.message, alert.target, alert.location
    );
    for field in &alert.fields {
        text.push_str(field);
        text.push('\n');
    }

    OutgoingMail {
        to: admins.to_vec(),
        subject: ALERT_SUBJECT.to_string(),
        html_body: format!("<pre>{}</pre>", microblog_api::email::escape_html(&text)),
        text_body: text,
    }
}

fn spawn_alert_forwarder(mailer: Arc<dyn Mailer>, admins: Vec<String>) -> AlertLayer {
    let (tx, mut rx) = mpsc::channel::<Alert>(ALERT_QUEUE);

    tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            // Logged below ERROR so a failing mail server cannot feed itself.
            if let Err(e) = mailer.send(alert_mail(&alert, &admins)).await {
                warn!("Failed to mail error alert: {:#}", e);
            }
        }
    });

    AlertLayer::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info};
    use tracing_subscriber::registry;

    #[test]
    fn only_errors_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = registry().with(AlertLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            info!("all good");
            error!(user_id = 7, "database is on fire");
        });

        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.message, "database is on fire");
        assert_eq!(alert.fields, vec!["user_id = 7"]);
        assert!(alert.location.contains("logging.rs"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let subscriber = registry().with(AlertLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            error!("first");
            error!("second");
        });

        assert_eq!(rx.try_recv().unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn log_file_is_dated_under_log_dir() {
        let dir = std::env::temp_dir().join(format!("microblog-logs-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let subscriber = registry().with(
            tfmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(file_appender(&dir).unwrap()),
        );
        tracing::subscriber::with_default(subscriber, || {
            info!("written to disk");
        });

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("microblog.log."));

        let contents = std::fs::read_to_string(dir.join(&names[0])).unwrap();
        assert!(contents.contains("written to disk"));
        assert!(contents.contains("logging.rs"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn alert_mail_goes_to_admins() {
        let alert = Alert {
            target: "microblog_api::error".to_string(),
            location: "src/error.rs:40".to_string(),
            message: "Request failed: <boom>".to_string(),
            fields: vec![],
        };
        let admins = vec!["ops@example.com".to_string()];

        let mail = alert_mail(&alert, &admins);
        assert_eq!(mail.subject, "Microblog Failure");
        assert_eq!(mail.to, admins);
        assert!(mail.text_body.contains("Request failed: <boom>"));
        assert!(mail.html_body.contains("&lt;boom&gt;"));
    }
}
