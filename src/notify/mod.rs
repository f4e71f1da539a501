//! Exception notification dispatch.
//!
//! [`NotificationDispatcher`] turns a failure into an email:
//!
//! ```text
//! error/panic -> ExceptionRecord ─┐
//! RequestEnv  -> RequestContext ──┼─> NotificationPayload -> template -> SMTP
//! Config.header ──────────────────┘
//! ```
//!
//! Everything runs inline on the calling thread. [`NotificationDispatcher::guarded_call`]
//! always hands the original error (or panic) back to the caller, whatever
//! the outcome of the notification.

pub mod transport;

use crate::config::{AppPaths, Config, parse_mailbox};
use crate::error::{ConfigError, NotifyError};
use crate::exception::{ExceptionRecord, PanicSiteCapture, ReportableError};
use crate::payload::NotificationPayload;
use crate::request::{RequestContext, RequestEnv};
use crate::template::TemplateEngine;
use lettre::address::Envelope;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

pub use transport::{MailTransport, SmtpMailTransport};

/// Sends exception notifications for one application.
///
/// Holds the immutable configuration loaded at construction; each
/// notification builds its own payload, so a dispatcher can be shared
/// between threads.
pub struct NotificationDispatcher {
    config: Config,
    template: TemplateEngine,
    envelope: Envelope,
    transport: Arc<dyn MailTransport>,
}

impl NotificationDispatcher {
    /// Load `config/exception-email.yml` and the configured template from an
    /// application root and connect them to the configured SMTP server.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] if the configuration file does not exist,
    /// and any other [`ConfigError`] for an unusable configuration or template.
    pub fn from_app_root(
        root: impl Into<PathBuf>,
        environment: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let paths = AppPaths::new(root);
        let config = Config::load_from_root(&paths, environment)?;
        Self::new(config, &paths)
    }

    /// Build a dispatcher sending through SMTP.
    pub fn new(config: Config, paths: &AppPaths) -> Result<Self, ConfigError> {
        let template = TemplateEngine::load(&paths.template(&config.template))?;
        let transport = SmtpMailTransport::from_config(&config)?;
        Self::with_transport(config, template, Arc::new(transport))
    }

    /// Build a dispatcher with a custom transport.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidAddress`] if `header.from` or `header.to`
    /// cannot be used as envelope addresses.
    pub fn with_transport(
        config: Config,
        template: TemplateEngine,
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, ConfigError> {
        let envelope = build_envelope(&config)?;

        tracing::info!(
            server = %config.server,
            template = %template.name(),
            recipients = envelope.to().len(),
            "Exception notifier ready"
        );

        Ok(Self {
            config,
            template,
            envelope,
            transport,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Run `work`, notifying about any failure before handing it back.
    ///
    /// An `Err` is returned unchanged after the notification attempt; a
    /// panic is notified and then resumed with its original payload.
    /// A failed notification is logged and never replaces the original failure.
    ///
    /// `E` is any `std::error::Error`, `anyhow::Error` or boxed `dyn Error`.
    /// Panic notifications carry the backtrace of the panicking frame.
    pub fn guarded_call<T, E, F, K>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: ReportableError<K>,
    {
        let capture = PanicSiteCapture::enter();
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.notify_quietly(err.to_record());
                Err(err)
            }
            Err(payload) => {
                let backtrace = capture
                    .panic_backtrace()
                    .unwrap_or_else(|| Rc::new(Backtrace::capture()));
                let record =
                    ExceptionRecord::from_panic(payload.as_ref()).with_backtrace(&backtrace);
                self.notify_quietly(record);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Send a notification for `error`, with the request context when the
    /// failure happened while serving an HTTP request.
    ///
    /// # Errors
    /// Returns [`NotifyError`] if rendering or sending fails.
    pub fn notify<E, K>(
        &self,
        error: &E,
        request: Option<&mut RequestEnv<'_>>,
    ) -> Result<(), NotifyError>
    where
        E: ReportableError<K>,
    {
        self.notify_record(error.to_record(), request)
    }

    /// Send a notification for an already built record.
    pub fn notify_record(
        &self,
        record: ExceptionRecord,
        request: Option<&mut RequestEnv<'_>>,
    ) -> Result<(), NotifyError> {
        let span = tracing::info_span!(
            "notify",
            class = %record.class,
            server = %self.config.server
        );
        let _guard = span.enter();

        let message = match self.render(&record, request) {
            Ok(message) => message,
            Err(e) => {
                metrics::counter!(
                    "exception_notifier_notifications_failed_total",
                    "stage" => "render"
                )
                .increment(1);
                return Err(e);
            }
        };

        self.send(&message)
    }

    /// Render the notification message without sending it.
    pub fn render(
        &self,
        record: &ExceptionRecord,
        request: Option<&mut RequestEnv<'_>>,
    ) -> Result<String, NotifyError> {
        let request = request.map(RequestContext::extract);
        let payload = NotificationPayload::build(
            &self.config.header,
            record,
            request.as_ref(),
            self.config.application_name.as_deref(),
        );
        Ok(self.template.render(&payload)?)
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let raw = normalize_line_endings(message);

        match self.transport.send_raw(&self.envelope, raw.as_bytes()) {
            Ok(()) => {
                tracing::info!(
                    recipients = self.envelope.to().len(),
                    "Exception notification sent"
                );
                metrics::counter!("exception_notifier_notifications_sent_total").increment(1);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send exception notification");
                metrics::counter!(
                    "exception_notifier_notifications_failed_total",
                    "stage" => "send"
                )
                .increment(1);
                Err(NotifyError::SendFailed(e))
            }
        }
    }

    fn notify_quietly(&self, record: ExceptionRecord) {
        let class = record.class.clone();
        if let Err(e) = self.notify_record(record, None) {
            tracing::error!(
                error = %e,
                class = %class,
                "Exception notification failed, propagating original failure"
            );
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("server", &self.config.server)
            .field("template", &self.template.name())
            .field("envelope", &self.envelope)
            .finish()
    }
}

fn build_envelope(config: &Config) -> Result<Envelope, ConfigError> {
    let from = parse_mailbox("header.from", &config.header.from)?.email;
    let to = config
        .header
        .to
        .addresses()
        .into_iter()
        .map(|addr| parse_mailbox("header.to", addr).map(|mailbox| mailbox.email))
        .collect::<Result<Vec<_>, _>>()?;

    Envelope::new(Some(from), to)
        .map_err(|e| ConfigError::ValidationError(format!("invalid envelope: {}", e)))
}

/// SMTP requires CRLF line endings; templates are usually written with LF.
fn normalize_line_endings(message: &str) -> String {
    message.replace("\r\n", "\n").replace('\n', "\r\n")
}
