//! Layouts turning a [`LogRecord`] into payload bytes.
//!
//! A layout may also supply a header and a footer; the appender frames
//! `header + body + footer` into a single payload.

use crate::record::LogRecord;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub trait Layout: Send + Sync {
    fn header(&self) -> Option<Vec<u8>> {
        None
    }

    fn format(&self, record: &LogRecord) -> Vec<u8>;

    fn footer(&self) -> Option<Vec<u8>> {
        None
    }
}

/// The record's message bytes, nothing else.
#[derive(Debug, Clone, Default)]
pub struct RawLayout;

impl Layout for RawLayout {
    fn format(&self, record: &LogRecord) -> Vec<u8> {
        record.message.as_bytes().to_vec()
    }
}

/// A single structured log entry.
#[derive(Debug, Serialize)]
struct JsonEntry<'a> {
    /// RFC 3339 timestamp
    timestamp: String,
    level: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a str>,
    pid: u32,
    target: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a BTreeMap<String, serde_json::Value>,
}

fn no_fields(fields: &&BTreeMap<String, serde_json::Value>) -> bool {
    fields.is_empty()
}

/// One JSON object per record.
#[derive(Debug, Clone)]
pub struct JsonLayout {
    service: Option<String>,
    pid: u32,
}

impl Default for JsonLayout {
    fn default() -> Self {
        Self {
            service: None,
            pid: std::process::id(),
        }
    }
}

impl JsonLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every entry with a service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

impl Layout for JsonLayout {
    fn format(&self, record: &LogRecord) -> Vec<u8> {
        let entry = JsonEntry {
            timestamp: record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            level: record.level_str(),
            service: self.service.as_deref(),
            pid: self.pid,
            target: &record.target,
            message: &record.message,
            fields: &record.fields,
        };

        serde_json::to_vec(&entry).unwrap_or_else(|_| record.message.as_bytes().to_vec())
    }
}

/// `timestamp LEVEL target - message key=value...`
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    header: Option<String>,
    footer: Option<String>,
}

impl TextLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

impl Layout for TextLayout {
    fn header(&self) -> Option<Vec<u8>> {
        self.header.as_ref().map(|h| h.as_bytes().to_vec())
    }

    fn format(&self, record: &LogRecord) -> Vec<u8> {
        let mut line = format!(
            "{} {:<5} {} - {}",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level_str(),
            record.target,
            record.message
        );
        for (name, value) in &record.fields {
            match value {
                serde_json::Value::String(s) => line.push_str(&format!(" {}={}", name, s)),
                other => line.push_str(&format!(" {}={}", name, other)),
            }
        }
        line.into_bytes()
    }

    fn footer(&self) -> Option<Vec<u8>> {
        self.footer.as_ref().map(|f| f.as_bytes().to_vec())
    }
}

/// Layout selector for configuration and the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Raw,
    Json,
    Text,
}

impl LayoutKind {
    pub fn build(self, service: &str) -> Box<dyn Layout> {
        match self {
            LayoutKind::Raw => Box::new(RawLayout),
            LayoutKind::Json => Box::new(JsonLayout::new().with_service(service)),
            LayoutKind::Text => Box::new(TextLayout::new()),
        }
    }
}

impl FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(LayoutKind::Raw),
            "json" => Ok(LayoutKind::Json),
            "text" => Ok(LayoutKind::Text),
            other => Err(format!("unknown layout: {} (expected raw, json or text)", other)),
        }
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayoutKind::Raw => "raw",
            LayoutKind::Json => "json",
            LayoutKind::Text => "text",
        };
        f.write_str(name)
    }
}
