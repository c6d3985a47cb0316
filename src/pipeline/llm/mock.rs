use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{LlmClient, LlmError};

enum MockReply {
    Text(String),
    Timeout,
    Backend(u16, String),
}

/// Test double for the generation backend. Returns a canned reply or a
/// canned failure and counts calls.
pub struct MockLlmClient {
    reply: MockReply,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::with_reply(MockReply::Text(response.to_string()))
    }

    /// Every call fails as if the request exceeded its deadline.
    pub fn timing_out() -> Self {
        Self::with_reply(MockReply::Timeout)
    }

    pub fn failing(status: u16, body: &str) -> Self {
        Self::with_reply(MockReply::Backend(status, body.to_string()))
    }

    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        match &self.reply {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Timeout => Err(LlmError::Timeout(60)),
            MockReply::Backend(status, body) => Err(LlmError::Backend {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    fn default_model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_configured_response_and_counts() {
        let client = MockLlmClient::new("respuesta");
        assert_eq!(client.generate("m", "p1", "s").unwrap(), "respuesta");
        assert_eq!(client.generate("m", "p2", "s").unwrap(), "respuesta");
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.last_prompt().as_deref(), Some("p2"));
    }

    #[test]
    fn timing_out_client_fails() {
        let client = MockLlmClient::timing_out();
        assert!(matches!(client.generate("m", "p", "s"), Err(LlmError::Timeout(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn failing_client_reports_status() {
        let client = MockLlmClient::failing(503, "overloaded");
        match client.generate("m", "p", "s") {
            Err(LlmError::Backend { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
