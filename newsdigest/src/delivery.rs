use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use common::{EmailConfig, RunState, RunStateStore};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::pipeline::{Digest, Fatal, StageExt};
use crate::render::{render_digest, render_plain_text};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PASSWORD_ENV: &str = "SMTP_PASSWORD";
const DEFAULT_SUBJECT_PREFIX: &str = "Tech digest";

/// Sends digests and failure notices over SMTP (STARTTLS).
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    subject_prefix: String,
}

impl Mailer {
    /// Build a mailer from config. The password is read from the environment
    /// variable named by `password_env`.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let password_env = cfg.password_env.as_deref().unwrap_or(DEFAULT_PASSWORD_ENV);
        let password = std::env::var(password_env)
            .with_context(|| format!("SMTP password env var '{}' not set", password_env))?;
        Self::with_password(cfg, password)
    }

    pub fn with_password(cfg: &EmailConfig, password: String) -> Result<Self> {
        let from: Mailbox = cfg
            .sender_email
            .parse()
            .with_context(|| format!("Invalid sender address: {}", cfg.sender_email))?;
        let to: Mailbox = cfg
            .recipient
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", cfg.recipient))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_server)
            .with_context(|| format!("Invalid SMTP relay: {}", cfg.smtp_server))?
            .port(cfg.smtp_port.unwrap_or(DEFAULT_SMTP_PORT))
            .credentials(Credentials::new(cfg.sender_email.clone(), password))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            subject_prefix: cfg
                .subject_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
        })
    }

    pub fn digest_subject(&self, at: DateTime<Local>) -> String {
        format!("{} - {}", self.subject_prefix, at.format("%d %B %Y %H:%M"))
    }

    /// multipart/alternative message with the text part first.
    pub fn digest_message(&self, subject: &str, html: &str, plain: &str) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                plain.to_string(),
                html.to_string(),
            ))
            .context("Failed to build digest email")
    }

    /// Plain-text failure notice, with the run log attached when there is one.
    pub fn error_message(
        &self,
        stage: &str,
        error: &str,
        log: Option<LogAttachment>,
    ) -> Result<Message> {
        let body = format!(
            "The digest run failed and no digest was delivered.\n\n\
             Stage: {stage}\nError: {error}\n\n\
             The last execution timestamp was left unchanged, so the next run \
             covers the same window.\n"
        );
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("[ERROR] {} - {}", self.subject_prefix, stage));

        let message = match log {
            None => builder.header(ContentType::TEXT_PLAIN).body(body),
            Some(log) => builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(
                        Attachment::new(log.filename).body(log.content, ContentType::TEXT_PLAIN),
                    ),
            ),
        };
        message.context("Failed to build error email")
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        info!(to = %self.to, "email sent");
        Ok(())
    }
}

/// A log file to attach to a failure notice.
#[derive(Debug, Clone)]
pub struct LogAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl LogAttachment {
    /// Read the log at `path`. A missing or unreadable log is skipped with a
    /// warning; the notice is still worth sending without it.
    pub async fn read(path: &Path) -> Option<Self> {
        match tokio::fs::read(path).await {
            Ok(content) => Some(Self {
                filename: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "newsdigest.log".to_string()),
                content,
            }),
            Err(e) => {
                warn!(path = %path.display(), "log file not attached: {}", e);
                None
            }
        }
    }
}

/// Where a rendered digest goes.
#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Stage reported when delivery fails.
    fn stage(&self) -> &'static str;

    async fn deliver(&self, html: &str, generated_at: DateTime<Local>) -> Result<()>;
}

#[async_trait]
impl DigestSink for Mailer {
    fn stage(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, html: &str, generated_at: DateTime<Local>) -> Result<()> {
        let plain = render_plain_text(html);
        let message = self.digest_message(&self.digest_subject(generated_at), html, &plain)?;
        self.send(message).await
    }
}

/// Dry-run sink: writes the digest to a file.
pub struct HtmlFile {
    path: PathBuf,
}

impl HtmlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DigestSink for HtmlFile {
    fn stage(&self) -> &'static str {
        "output"
    }

    async fn deliver(&self, html: &str, _generated_at: DateTime<Local>) -> Result<()> {
        info!("DRY RUN - not sending email");
        write_html(&self.path, html).await
    }
}

/// Render and deliver `digest`, then save `next_state`.
///
/// An empty digest is not delivered but still commits. When delivery fails
/// nothing is saved, so the next run covers the same window again.
/// Returns whether a digest was delivered.
pub async fn deliver_and_commit<S: DigestSink + ?Sized>(
    digest: &Digest,
    sink: &S,
    generated_at: DateTime<Local>,
    store: &RunStateStore,
    next_state: &RunState,
) -> Result<bool, Fatal> {
    let delivered = if digest.is_empty() {
        info!("No new articles found; skipping delivery");
        false
    } else {
        let html = render_digest(digest, generated_at);
        sink.deliver(&html, generated_at).await.stage(sink.stage())?;
        true
    };

    store.save(next_state).await.stage("state")?;
    info!(last_execution = ?next_state.read(), "Updated last execution timestamp");
    Ok(delivered)
}

/// Write the rendered digest to disk for inspection.
pub async fn write_html(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    tokio::fs::write(path, html)
        .await
        .with_context(|| format!("Failed to write digest to {}", path.display()))?;
    info!(path = %path.display(), "digest saved");
    Ok(())
}
