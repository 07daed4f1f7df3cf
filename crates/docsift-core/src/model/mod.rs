//! Extraction-model backend trait and implementations.

pub mod gemini;
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use gemini::GeminiModel;
pub use mock::{MockModel, MockModelResponse};

#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// The call exceeded its deadline.
    #[error("model call timed out")]
    Timeout,
    /// Transport or HTTP-level failure.
    #[error("model request failed: {0}")]
    Request(String),
    /// The service answered but the response carried no text.
    #[error("model returned an empty response: {0}")]
    Empty(String),
}

/// An extraction-model service that turns a prompt into raw text.
///
/// No well-formedness of the returned text is assumed; the
/// orchestrator parses and validates it (with retry) downstream.
pub trait ModelBackend: Send + Sync {
    /// Backend name for logs and the result audit (e.g. "gemini-2.0-flash").
    fn name(&self) -> &str;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;
}
