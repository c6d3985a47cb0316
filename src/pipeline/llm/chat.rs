use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{LlmClient, LlmError};

/// Client for OpenAI-compatible `/chat/completions` endpoints (DeepSeek, OpenAI, vLLM).
///
/// Built without a key it still constructs; every call then fails with
/// `MissingApiKey`, which the synchronizer surfaces as a warning.
pub struct ChatCompletionClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else {
            LlmError::HttpClient(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn build_messages<'a>(prompt: &'a str, system: &'a str) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(ChatMessage { role: "system", content: system });
    }
    messages.push(ChatMessage { role: "user", content: prompt });
    messages
}

impl LlmClient for ChatCompletionClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: build_messages(prompt, system),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::ResponseParsing(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ResponseParsing("response has no choices".into()))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let client =
            ChatCompletionClient::new("https://api.deepseek.com/", Some("sk-test"), "deepseek-chat", 60)
                .unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com");
        assert_eq!(client.default_model(), "deepseek-chat");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn missing_key_fails_every_call() {
        for key in [None, Some("  ")] {
            let client = ChatCompletionClient::new("https://api.deepseek.com", key, "m", 60).unwrap();
            assert!(!client.has_api_key());
            assert!(matches!(client.generate("m", "p", ""), Err(LlmError::MissingApiKey)));
        }
    }

    #[test]
    fn system_message_omitted_when_empty() {
        let messages = build_messages("hola", "");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");

        let messages = build_messages("hola", "Eres médico");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "deepseek-chat",
            messages: build_messages("p", "s"),
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][1]["content"], "p");
    }

    #[test]
    fn response_content_extracted() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"ok"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[test]
    fn unreachable_backend_is_connection_error() {
        // Nothing listens on the loopback discard port
        let client = ChatCompletionClient::new("http://127.0.0.1:9", Some("k"), "m", 5).unwrap();
        let err = client.generate("m", "p", "").unwrap_err();
        assert!(
            matches!(err, LlmError::Connection(_) | LlmError::HttpClient(_)),
            "got {err:?}"
        );
    }
}
