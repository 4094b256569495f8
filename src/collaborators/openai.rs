//! Synthesis discovery over an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{classify_reqwest, classify_status, CollaboratorError, SynthesisAgent};

const SERVICE: &str = "LLM provider";

const SYSTEM_PROMPT: &str = "You are a materials synthesis expert. For the requested material, \
identify the target formula, summarise known synthesis routes (precursors, temperatures, \
durations, atmospheres), and recommend the most reliable procedure. Use plain text with \
short headed sections.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiSynthesisAgent {
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiSynthesisAgent {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Upstream(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

fn first_content(response: ChatResponse) -> Result<String, CollaboratorError> {
    response
        .choices
        .into_iter()
        .find_map(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| CollaboratorError::Upstream("empty completion".to_string()))
}

#[async_trait]
impl SynthesisAgent for OpenAiSynthesisAgent {
    async fn discover(&self, api_key: &str, query: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: query,
                },
            ],
        };
        debug!(model = %self.model, "Requesting synthesis analysis");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest(SERVICE, &e, CollaboratorError::Upstream))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(SERVICE, status, &text, CollaboratorError::Upstream));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify_reqwest(SERVICE, &e, CollaboratorError::Upstream))?;
        first_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null}},{"message":{"content":"Fe2O3 via calcination"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(parsed).unwrap(), "Fe2O3 via calcination");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(empty), Err(CollaboratorError::Upstream(_))));
    }

    #[test]
    fn test_request_shape() {
        let req = ChatRequest {
            model: "m",
            messages: [
                ChatMessage { role: "system", content: "s" },
                ChatMessage { role: "user", content: "q" },
            ],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "m");
        assert_eq!(v["messages"][1]["content"], "q");
    }
}
