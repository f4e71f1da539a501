//! HTTP request context for notifications raised while serving a request.
//!
//! The host describes the request with a CGI-style environment mapping
//! (`REQUEST_URI`, `REMOTE_ADDR`, `HTTP_*` headers, ...) and, optionally,
//! a rewindable body stream. [`RequestContext::extract`] turns that into
//! the `request_data`, `environment_data` and `server_name` template fields.

use indexmap::IndexMap;
use serde::Serialize;
use std::io::{BufRead, Read, Seek, SeekFrom};

pub const REQUEST_URI: &str = "REQUEST_URI";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const HTTP_X_FORWARDED_FOR: &str = "HTTP_X_FORWARDED_FOR";
pub const HTTP_USER_EMAIL: &str = "HTTP_USER_EMAIL";
pub const SERVER_NAME: &str = "SERVER_NAME";

/// Readable, rewindable request body.
pub trait RequestBody: BufRead + Seek {}

impl<T: BufRead + Seek + ?Sized> RequestBody for T {}

/// Environment of the request being served when the failure happened.
///
/// Entries keep their insertion order, which is the order used for the
/// `environment_data` dump.
#[derive(Default)]
pub struct RequestEnv<'a> {
    vars: IndexMap<String, String>,
    input: Option<&'a mut dyn RequestBody>,
}

impl<'a> RequestEnv<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`RequestEnv::set`].
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Attach the request body. It is rewound before being read.
    pub fn with_input(mut self, input: &'a mut dyn RequestBody) -> Self {
        self.input = Some(input);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Read the whole body from its start. Returns `None` without a body.
    fn read_body(&mut self) -> Option<String> {
        let input = self.input.as_mut()?;
        let mut body = Vec::new();
        let read = input
            .seek(SeekFrom::Start(0))
            .and_then(|_| input.read_to_end(&mut body));

        match read {
            Ok(_) => Some(String::from_utf8_lossy(&body).into_owned()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request body, omitting parameters");
                None
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for RequestEnv<'_>
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            input: None,
        }
    }
}

impl std::fmt::Debug for RequestEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEnv")
            .field("vars", &self.vars)
            .field("has_input", &self.input.is_some())
            .finish()
    }
}

/// The `request_data` template field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

/// Everything derived from a request environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_data: RequestData,
    /// One ` * KEY: value` line per environment entry.
    pub environment_data: String,
    /// First label of `SERVER_NAME`.
    pub server_name: Option<String>,
}

impl RequestContext {
    /// Derive the request context. Consumes the body stream, if any.
    pub fn extract(env: &mut RequestEnv<'_>) -> Self {
        let ip_address = env
            .get(HTTP_X_FORWARDED_FOR)
            .filter(|v| !v.is_empty())
            .or_else(|| env.get(REMOTE_ADDR))
            .map(str::to_string);

        let parameters = env.read_body().filter(|body| !body.is_empty());

        let request_data = RequestData {
            url: env.get(REQUEST_URI).map(str::to_string),
            ip_address,
            user: env.get(HTTP_USER_EMAIL).map(str::to_string),
            parameters,
        };

        let environment_data = env
            .vars()
            .map(|(key, value)| format!(" * {}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n");

        let server_name = env
            .get(SERVER_NAME)
            .and_then(|name| name.split('.').next())
            .filter(|label| !label.is_empty())
            .map(str::to_string);

        Self {
            request_data,
            environment_data,
            server_name,
        }
    }
}
