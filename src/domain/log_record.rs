use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single line of workload output, newline-stripped, ready for shipping.
///
/// Records are immutable once handed to the writer; ownership moves through
/// the queue, the batch and finally the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Identifier of the producing container (or component).
    #[serde(rename = "id", default)]
    pub stream_id: String,
    /// Stream name; live-tail subscribers register against this.
    #[serde(default)]
    pub name: String,
    /// `stdout`, `stderr`, or an internal tag.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub ident: String,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "datetime", default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl LogRecord {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = entrypoint.into();
        self
    }

    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = ident.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_wire_keys() {
        let record = LogRecord::new("web", "hello")
            .with_stream_id("c0ffee")
            .with_kind("stdout")
            .with_entrypoint("main")
            .with_ident("web_main-1")
            .with_timestamp("2024-01-01 00:00:00.000000");

        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "c0ffee");
        assert_eq!(value["name"], "web");
        assert_eq!(value["type"], "stdout");
        assert_eq!(value["entrypoint"], "main");
        assert_eq!(value["ident"], "web_main-1");
        assert_eq!(value["data"], "hello");
        assert_eq!(value["datetime"], "2024-01-01 00:00:00.000000");
        // Empty extra is left out of the line entirely
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_extra_is_serialized_when_present() {
        let record = LogRecord::new("web", "hello").with_extra("pod", "web-1");
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""extra":{"pod":"web-1"}"#));
    }

    #[test]
    fn test_missing_keys_default() {
        let record: LogRecord = serde_json::from_str(r#"{"name":"web"}"#).unwrap();
        assert_eq!(record.name, "web");
        assert!(record.data.is_empty());
        assert!(record.extra.is_empty());
    }
}
