//! exception-notifier - email notifications for unhandled errors.
//!
//! Wrap a unit of work with [`NotificationDispatcher::guarded_call`]: when it
//! fails, the failure is rendered through a template and mailed over SMTP,
//! then handed back to the caller unchanged.

pub mod cli;
pub mod config;
pub mod error;
pub mod exception;
pub mod notify;
pub mod payload;
pub mod request;
pub mod template;

// Re-export commonly used types
pub use config::{AppPaths, Config};
pub use error::{ConfigError, NotifyError, TemplateError};
pub use exception::{ExceptionRecord, ReportableError};
pub use notify::{MailTransport, NotificationDispatcher, SmtpMailTransport};
pub use payload::NotificationPayload;
pub use request::{RequestContext, RequestEnv};
pub use template::TemplateEngine;
