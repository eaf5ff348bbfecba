//! Configuration file loading.
//!
//! The bridge reads one JSON document holding the two whitelist pattern
//! lists plus the conversion tables backing the static factory. The
//! pattern list keys are configurable on the command line so several
//! bridge instances can share a document with differently-named lists.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::bridge::Domain;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A supported service conversion, keyed by the domain hosting it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicePairEntry {
    pub domain: Domain,
    pub package: String,
    pub name: String,
}

/// Everything the configuration document provides.
#[derive(Debug, Default)]
pub struct FileConfig {
    pub topic_patterns: Vec<String>,
    pub service_patterns: Vec<String>,
    pub type_pairs: Vec<(String, String)>,
    pub service_pairs: Vec<ServicePairEntry>,
}

impl FileConfig {
    /// Load the document and pull out the two pattern lists named by
    /// `topic_key` and `service_key`. A missing or non-array pattern
    /// list is an operator error worth a log line, but the bridge still
    /// starts; it just bridges nothing from that list.
    pub fn load(
        path: &Path,
        topic_key: &str,
        service_key: &str,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&text)?;

        Ok(Self {
            topic_patterns: pattern_list(&document, topic_key),
            service_patterns: pattern_list(&document, service_key),
            type_pairs: conversion_table(&document, "type_pairs"),
            service_pairs: conversion_table(&document, "service_pairs"),
        })
    }

    pub fn service_triples(&self) -> Vec<(Domain, String, String)> {
        self.service_pairs
            .iter()
            .map(|entry| (entry.domain, entry.package.clone(), entry.name.clone()))
            .collect()
    }
}

fn pattern_list(document: &Value, key: &str) -> Vec<String> {
    match document.get(key).and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        None => {
            tracing::error!(
                key = key,
                "configuration key is missing or not an array, using an empty pattern list"
            );
            Vec::new()
        }
    }
}

/// Conversion tables are optional; absence just means the static
/// factory supports nothing from that table.
fn conversion_table<T: serde::de::DeserializeOwned>(document: &Value, key: &str) -> Vec<T> {
    match document.get(key) {
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(table) => table,
            Err(error) => {
                tracing::error!(key = key, error = %error, "malformed conversion table, ignoring");
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_document() {
        let file = write_config(
            r#"{
                "topics_re": ["/scan.*", "/cmd.*"],
                "services_re": ["/reset"],
                "type_pairs": [["LaserScan", "sensors/LaserScan"]],
                "service_pairs": [
                    {"domain": "a", "package": "std_srvs", "name": "Trigger"}
                ]
            }"#,
        );

        let config = FileConfig::load(file.path(), "topics_re", "services_re").unwrap();
        assert_eq!(config.topic_patterns, vec!["/scan.*", "/cmd.*"]);
        assert_eq!(config.service_patterns, vec!["/reset"]);
        assert_eq!(
            config.type_pairs,
            vec![("LaserScan".to_string(), "sensors/LaserScan".to_string())]
        );

        let triples = config.service_triples();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].0, Domain::A);
        assert_eq!(triples[0].1, "std_srvs");
        assert_eq!(triples[0].2, "Trigger");
    }

    #[test]
    fn test_missing_pattern_list_is_empty() {
        let file = write_config(r#"{"topics_re": ["/scan"]}"#);
        let config = FileConfig::load(file.path(), "topics_re", "services_re").unwrap();
        assert_eq!(config.topic_patterns, vec!["/scan"]);
        assert!(config.service_patterns.is_empty());
    }

    #[test]
    fn test_non_array_pattern_list_is_empty() {
        let file = write_config(r#"{"topics_re": "/scan"}"#);
        let config = FileConfig::load(file.path(), "topics_re", "services_re").unwrap();
        assert!(config.topic_patterns.is_empty());
    }

    #[test]
    fn test_custom_key_names() {
        let file = write_config(r#"{"left_topics": ["/a"], "left_services": ["/b"]}"#);
        let config = FileConfig::load(file.path(), "left_topics", "left_services").unwrap();
        assert_eq!(config.topic_patterns, vec!["/a"]);
        assert_eq!(config.service_patterns, vec!["/b"]);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let file = write_config("not json");
        assert!(matches!(
            FileConfig::load(file.path(), "topics_re", "services_re"),
            Err(ConfigError::Parse(_))
        ));
    }
}
