//! Mock extraction-model backend for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ModelBackend, ModelError};

/// A configurable mock response for [`MockModel`].
#[derive(Clone, Debug)]
pub enum MockModelResponse {
    /// Return this text as the raw model response.
    Text(String),
    /// Simulate a call that exceeds its deadline.
    Timeout,
    /// Simulate a transport failure.
    Error(String),
}

/// A hand-rolled mock implementing [`ModelBackend`] for tests.
///
/// Supports a fixed response or a sequence of responses (the last one
/// repeats if exhausted), optional per-call latency, and call counting
/// via [`call_count()`](MockModel::call_count).
pub struct MockModel {
    name: &'static str,
    /// Each call pops the next response; the fallback repeats after.
    responses: Mutex<Vec<MockModelResponse>>,
    fallback: MockModelResponse,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    /// Create a mock that always returns `response`.
    pub fn new(name: &'static str, response: MockModelResponse) -> Self {
        Self {
            name,
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(name: &'static str, mut responses: Vec<MockModelResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        // Reverse so we can pop() from the front cheaply.
        responses.reverse();
        let fallback = responses.first().cloned().unwrap();
        Self {
            name,
            responses: Mutex::new(responses),
            fallback,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Set simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `generate()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_response(&self) -> MockModelResponse {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl ModelBackend for MockModel {
    fn name(&self) -> &str {
        self.name
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let response = self.next_response();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockModelResponse::Text(text) => Ok(text),
                MockModelResponse::Timeout => Err(ModelError::Timeout),
                MockModelResponse::Error(msg) => Err(ModelError::Request(msg)),
            }
        })
    }
}
