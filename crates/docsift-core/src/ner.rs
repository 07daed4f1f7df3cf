//! Entity-recognition collaborator.
//!
//! Strictly advisory: a failure here degrades hint quality for the
//! entity layer but never fails the pipeline. Callers catch the error,
//! log it, and proceed with empty entity hints.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NerError {
    #[error("entity service request failed: {0}")]
    Request(String),
    #[error("unparseable entity response: {0}")]
    Parse(String),
}

/// Entity categories the hint builder understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityType {
    Organization,
    Person,
    Date,
    Money,
    Location,
    Other(String),
}

impl EntityType {
    /// Map common NER label schemes (spaCy-style) onto our categories.
    pub fn from_label(label: &str) -> EntityType {
        match label.to_ascii_uppercase().as_str() {
            "ORG" | "ORGANIZATION" => EntityType::Organization,
            "PERSON" | "PER" => EntityType::Person,
            "DATE" => EntityType::Date,
            "MONEY" => EntityType::Money,
            "GPE" | "LOC" | "LOCATION" => EntityType::Location,
            other => EntityType::Other(other.to_string()),
        }
    }
}

/// A recognized entity span over the formatted document text.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub text: String,
    pub entity_type: EntityType,
    /// Byte offset of the span start in the analyzed text, when the
    /// service reports one.
    pub start: Option<usize>,
}

/// An external named-entity model: `(text) -> entities`.
pub trait EntityRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize<'a>(
        &'a self,
        text: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Entity>, NerError>> + Send + 'a>>;
}

/// Disabled entity layer: recognizes nothing, never fails.
pub struct NoopRecognizer;

impl EntityRecognizer for NoopRecognizer {
    fn name(&self) -> &str {
        "noop"
    }

    fn recognize<'a>(
        &'a self,
        _text: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Entity>, NerError>> + Send + 'a>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[derive(Deserialize)]
struct WireEntity {
    span_text: String,
    entity_type: String,
    #[serde(default)]
    start: Option<usize>,
}

/// HTTP entity-recognition service client.
///
/// POSTs `{"text": ...}` to the configured URL and expects a JSON
/// array of `{span_text, entity_type, start?}` objects.
pub struct HttpEntityRecognizer {
    pub url: String,
}

impl HttpEntityRecognizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl EntityRecognizer for HttpEntityRecognizer {
    fn name(&self) -> &str {
        "http-ner"
    }

    fn recognize<'a>(
        &'a self,
        text: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Entity>, NerError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = client
                .post(&self.url)
                .json(&serde_json::json!({ "text": text }))
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| NerError::Request(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(NerError::Request(format!("HTTP {}", status)));
            }

            let wire: Vec<WireEntity> = resp
                .json()
                .await
                .map_err(|e| NerError::Parse(e.to_string()))?;

            Ok(wire
                .into_iter()
                .map(|e| Entity {
                    text: e.span_text,
                    entity_type: EntityType::from_label(&e.entity_type),
                    start: e.start,
                })
                .collect())
        })
    }
}
