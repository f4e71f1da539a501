//! Outbound mail transport.
//!
//! The dispatcher talks to a [`MailTransport`] so tests can inject a
//! recording mock; production uses the blocking lettre SMTP transport.

use crate::config::{Config, TlsMode};
use crate::error::ConfigError;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport};

/// Blocking mail transport abstraction.
///
/// Implementations must be `Send + Sync` so a dispatcher can be shared
/// between threads.
pub trait MailTransport: Send + Sync {
    /// Submit a complete message for the given envelope.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Message accepted by the server
    /// * `Err(String)` - Error message describing the failure
    fn send_raw(&self, envelope: &Envelope, message: &[u8]) -> Result<(), String>;
}

/// SMTP transport wrapper implementing [`MailTransport`].
pub struct SmtpMailTransport {
    inner: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(transport: SmtpTransport) -> Self {
        Self { inner: transport }
    }

    /// Build the transport from the `server`, `port`, `tls` and credential settings.
    ///
    /// No connection is opened until the first send.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let host = config.server.as_str();

        let builder = match config.tls {
            TlsMode::None => SmtpTransport::builder_dangerous(host).port(config.port),
            TlsMode::Starttls => SmtpTransport::builder_dangerous(host)
                .port(config.port)
                .tls(Tls::Required(Self::tls_parameters(config)?)),
            TlsMode::Tls => SmtpTransport::builder_dangerous(host)
                .port(config.port)
                .tls(Tls::Wrapper(Self::tls_parameters(config)?)),
        };

        let builder = match config.credentials()? {
            Some((username, password)) => {
                builder.credentials(Credentials::new(username, password.expose().to_string()))
            }
            None => builder,
        };

        tracing::debug!(
            server = %config.server,
            port = config.port,
            tls = ?config.tls,
            "SMTP transport configured"
        );

        Ok(Self::new(builder.build()))
    }

    fn tls_parameters(config: &Config) -> Result<TlsParameters, ConfigError> {
        let mut tls_builder = TlsParameters::builder(config.server.clone());
        if !config.tls_verify {
            // Self-signed relay certificates
            tls_builder = tls_builder.dangerous_accept_invalid_certs(true);
        }
        tls_builder
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("TLS configuration error: {}", e)))
    }
}

impl MailTransport for SmtpMailTransport {
    fn send_raw(&self, envelope: &Envelope, message: &[u8]) -> Result<(), String> {
        self.inner
            .send_raw(envelope, message)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
