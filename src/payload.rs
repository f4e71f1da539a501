//! Notification payload: the substitution context handed to the template.
//!
//! Every notification builds its own payload, starting from a copy of the
//! configured header and layering exception, request and application data
//! on top. Layers add or replace individual keys; they never replace the
//! payload as a whole, and the envelope keys `from`/`to` are never overwritten.

use crate::config::{HeaderConfig, Recipients};
use crate::exception::ExceptionRecord;
use crate::request::RequestContext;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Header keys that drive the SMTP envelope.
const ENVELOPE_KEYS: [&str; 2] = ["from", "to"];

/// Merged key-value context used to render the notification template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NotificationPayload {
    fields: Map<String, Value>,
}

impl NotificationPayload {
    /// Start a payload from a copy of the configured header.
    pub fn from_header(header: &HeaderConfig) -> Self {
        let mut fields: Map<String, Value> = header
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.insert("from".to_string(), Value::String(header.from.clone()));
        let to = match &header.to {
            Recipients::One(addr) => json!(addr),
            Recipients::Many(addrs) => json!(addrs),
        };
        fields.insert("to".to_string(), to);
        Self { fields }
    }

    /// Assemble the payload in layering order: header, exception,
    /// request (when present), application name (when configured), date.
    pub fn build(
        header: &HeaderConfig,
        exception: &ExceptionRecord,
        request: Option<&RequestContext>,
        application_name: Option<&str>,
    ) -> Self {
        let mut payload = Self::from_header(header).with_exception(exception);
        if let Some(request) = request {
            payload = payload.with_request(request);
        }
        if let Some(name) = application_name {
            payload = payload.with_application_name(name);
        }
        payload.with_date(Utc::now())
    }

    /// Layer `fields` on top of the payload, key by key.
    ///
    /// Existing keys are replaced except for the envelope keys.
    pub fn merge(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            if ENVELOPE_KEYS.contains(&key.as_str()) && self.fields.contains_key(&key) {
                tracing::debug!(key = %key, "Ignoring payload field shadowing an envelope key");
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    pub fn with_exception(mut self, record: &ExceptionRecord) -> Self {
        let mut layer = Map::new();
        layer.insert(
            "exception".to_string(),
            json!({
                "class": record.class,
                "message": record.message,
                "summary": record.summary(),
                "backtrace": record.backtrace_text(),
                "causes": record.causes,
            }),
        );
        self.merge(layer);
        self
    }

    pub fn with_request(mut self, request: &RequestContext) -> Self {
        let mut layer = Map::new();
        layer.insert(
            "request_data".to_string(),
            serde_json::to_value(&request.request_data).unwrap_or(Value::Null),
        );
        layer.insert(
            "environment_data".to_string(),
            Value::String(request.environment_data.clone()),
        );
        if let Some(server_name) = &request.server_name {
            layer.insert(
                "server_name".to_string(),
                Value::String(server_name.clone()),
            );
        }
        self.merge(layer);
        self
    }

    pub fn with_application_name(mut self, name: &str) -> Self {
        let mut layer = Map::new();
        layer.insert(
            "application_name".to_string(),
            Value::String(name.to_string()),
        );
        self.merge(layer);
        self
    }

    /// Add the notification date in RFC 2822 form, usable as a `Date:` header.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        let mut layer = Map::new();
        layer.insert("date".to_string(), Value::String(date.to_rfc2822()));
        self.merge(layer);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
