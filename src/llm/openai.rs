//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::RagError;

use super::TextGenerator;

#[derive(Clone)]
pub struct OpenAiCompatGenerator {
    base_url: String,
    model: String,
    client: Client,
}

impl OpenAiCompatGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn generate(&self, prompt: &str, stop: Option<Vec<String>>) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(stop) = stop {
                obj.insert("stop".to_string(), json!(stop));
            }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("chat endpoint error: {}", text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(RagError::Generation(
                "model returned an empty completion".to_string(),
            ));
        }

        Ok(content)
    }
}
