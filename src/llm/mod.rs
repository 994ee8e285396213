//! Language-model post-processing
//!
//! A thin collaborator used to clean up transcripts and apply voice-edit
//! instructions. Two providers, selected by `[providers] llm`: a local Ollama
//! server or an OpenAI-compatible chat endpoint. Requests are blocking ureq
//! calls wrapped in `spawn_blocking`.

use crate::config::{Config, LlmProvider, OllamaConfig, OpenaiLlmConfig};
use crate::error::LlmError;
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Generous ceiling; local models can be slow to first token
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Human-readable label of the active LLM backend, for ledger entries
pub fn model_label(config: &Config) -> String {
    match config.providers.llm {
        LlmProvider::Ollama => format!("ollama:{}", config.llm.ollama.model),
        LlmProvider::Openai => format!("openai:{}", config.llm.openai.model),
    }
}

/// Send `user` text with a system prompt and return the model's reply
pub async fn rewrite(config: &Config, system: &str, user: &str) -> Result<String, LlmError> {
    let provider = config.providers.llm;
    let ollama = config.llm.ollama.clone();
    let openai = config.llm.openai.clone();
    let system = system.to_string();
    let user = user.to_string();

    tokio::task::spawn_blocking(move || match provider {
        LlmProvider::Ollama => ollama_chat(&ollama, &system, &user),
        LlmProvider::Openai => openai_chat(&openai, &system, &user),
    })
    .await
    .map_err(|e| LlmError::Backend(format!("LLM task failed: {}", e)))?
}

fn ollama_chat(config: &OllamaConfig, system: &str, user: &str) -> Result<String, LlmError> {
    let url = format!("{}/api/chat", config.host.trim_end_matches('/'));

    let response = ureq::post(&url)
        .timeout(REQUEST_TIMEOUT)
        .send_json(json!({
            "model": config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
        }))
        .map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                LlmError::Backend(format!("server returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => LlmError::Unavailable(format!("{}: {}", url, t)),
        })?;

    let body: serde_json::Value = response
        .into_json()
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    body.pointer("/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse(format!("missing message content: {}", body)))
}

fn openai_chat(config: &OpenaiLlmConfig, system: &str, user: &str) -> Result<String, LlmError> {
    let base = config
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/');
    let url = format!("{}/v1/chat/completions", base);

    let mut request = ureq::post(&url).timeout(REQUEST_TIMEOUT);

    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if let Some(ref key) = api_key {
        request = request.set("Authorization", &format!("Bearer {}", key));
    }

    let response = request
        .send_json(json!({
            "model": config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        }))
        .map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                LlmError::Backend(format!("server returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => LlmError::Unavailable(format!("{}: {}", url, t)),
        })?;

    let body: serde_json::Value = response
        .into_json()
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    body.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse(format!("missing message content: {}", body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Minimal one-shot HTTP server answering with a canned JSON body
    fn canned_server(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_ollama_chat_extracts_content() {
        let host = canned_server(r#"{"message":{"role":"assistant","content":"Hello, world!"}}"#);
        let config = OllamaConfig {
            model: "llama3.2".to_string(),
            host,
        };
        let reply = ollama_chat(&config, "be brief", "hello world").unwrap();
        assert_eq!(reply, "Hello, world!");
    }

    #[test]
    fn test_openai_chat_extracts_content() {
        let base = canned_server(
            r#"{"choices":[{"message":{"role":"assistant","content":"Corrected text."}}]}"#,
        );
        let config = OpenaiLlmConfig {
            model: "gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(base),
        };
        let reply = openai_chat(&config, "fix grammar", "teh text").unwrap();
        assert_eq!(reply, "Corrected text.");
    }

    #[test]
    fn test_ollama_chat_rejects_missing_content() {
        let host = canned_server(r#"{"done": true}"#);
        let config = OllamaConfig {
            model: "llama3.2".to_string(),
            host,
        };
        assert!(matches!(
            ollama_chat(&config, "s", "u"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_model_label() {
        let config = Config::default();
        assert_eq!(model_label(&config), "ollama:llama3.2");
    }
}
