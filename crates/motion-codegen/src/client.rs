//! Chat-completion backed generator

use crate::error::GenerationError;
use crate::prompt::system_instruction;
use crate::scene::normalize_model_output;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prompt-to-source conversion
///
/// Implementations return source that already passed fence stripping and
/// entry-point validation.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate scene source for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Model backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// OpenAI-compatible API root, without trailing `/chat/completions`
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Pinned animation library version named in the system instruction
    pub library_version: String,
    /// Ask once more when the first answer is empty or lacks the entry point
    pub retry_on_empty: bool,
    /// Read from the environment, never from the config file
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.5,
            request_timeout_secs: 120,
            library_version: "0.18".to_string(),
            retry_on_empty: true,
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generator talking to an OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    endpoint: String,
    config: GeneratorConfig,
    instruction: String,
}

impl ChatCompletionGenerator {
    /// Build generator from config
    ///
    /// # Errors
    /// Returns `Config` if the API key is missing or the HTTP client cannot be built
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(GenerationError::Config("missing model API key".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let instruction = system_instruction(&config.library_version);

        Ok(Self {
            client,
            endpoint,
            config,
            instruction,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.instruction,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CodeGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let attempts = if self.config.retry_on_empty { 2 } else { 1 };
        let mut last_error = GenerationError::Empty;

        for attempt in 1..=attempts {
            let raw = self.request(prompt).await?;
            match normalize_model_output(&raw) {
                Ok(scene) => {
                    tracing::debug!(
                        "Generated {} bytes of scene source on attempt {}",
                        scene.as_str().len(),
                        attempt
                    );
                    return Ok(scene.into_string());
                }
                Err(e @ (GenerationError::Empty | GenerationError::MissingEntryPoint { .. })) => {
                    tracing::warn!("Unusable model output on attempt {}: {}", attempt, e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        self.wait()\n";

    async fn read_request(stream: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve one canned chat reply per connection, in order
    async fn serve(replies: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        (format!("http://{addr}/v1"), hits)
    }

    fn reply(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    fn generator(base_url: String) -> ChatCompletionGenerator {
        ChatCompletionGenerator::new(GeneratorConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            request_timeout_secs: 5,
            ..GeneratorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_api_key() {
        let err = ChatCompletionGenerator::new(GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, GenerationError::Config(_)));
    }

    #[tokio::test]
    async fn strips_fences_from_reply() {
        let (url, hits) = serve(vec![(200, reply(&format!("```python\n{SCENE}```")))]).await;
        let source = generator(url).generate("a circle").await.unwrap();
        assert_eq!(source, SCENE.trim_end());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_once_on_empty_reply() {
        let (url, hits) = serve(vec![(200, reply("   ")), (200, reply(SCENE))]).await;
        let source = generator(url).generate("a circle").await.unwrap();
        assert!(source.contains("class GeneratedScene"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_empty_reply() {
        let (url, _) = serve(vec![(200, reply("")), (200, reply(""))]).await;
        let err = generator(url).generate("a circle").await.unwrap_err();
        assert!(matches!(err, GenerationError::Empty));
    }

    #[tokio::test]
    async fn surfaces_http_status() {
        let (url, _) = serve(vec![(503, "{\"error\":\"overloaded\"}".to_string())]).await;
        let err = generator(url).generate("a circle").await.unwrap_err();
        assert!(matches!(err, GenerationError::Http { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
