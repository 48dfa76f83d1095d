//! Semantic classifier backed by an OpenAI-style chat completions API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::models::{Amenity, FieldName};
use crate::scrapers::traits::SemanticClassifier;

pub fn chat_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

pub struct OpenAiClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build classifier http client")?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(base_url),
            api_key,
            model,
        })
    }

    async fn json_object_reply(&self, instructions: &str, input: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": input },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read classifier response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("classifier API error ({status}): {message}");
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse classifier response")?;
        let content = value
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing message content in classifier response"))?;

        serde_json::from_str(content).context("parse classifier reply as JSON object")
    }
}

#[async_trait]
impl SemanticClassifier for OpenAiClassifier {
    async fn classify_amenities(
        &self,
        text: &str,
        vocabulary: &[Amenity],
    ) -> Result<BTreeMap<Amenity, bool>> {
        let names = vocabulary
            .iter()
            .map(|amenity| format!("\"{}\"", amenity.label()))
            .collect::<Vec<_>>()
            .join(", ");
        let instructions = format!(
            "You read vacation-listing amenity text and decide which amenities are present.\n\
             Reply with a single JSON object mapping each of these names to true or false: {names}.\n\
             Omit a name if you cannot tell from the text."
        );

        let reply = self.json_object_reply(&instructions, text).await?;
        let mut determined = BTreeMap::new();
        if let Some(object) = reply.as_object() {
            for amenity in vocabulary {
                if let Some(flag) = object.get(amenity.label()).and_then(|value| value.as_bool()) {
                    determined.insert(*amenity, flag);
                }
            }
        }
        debug!(determined = determined.len(), "classifier amenity reply");
        Ok(determined)
    }

    async fn extract_fields(
        &self,
        text: &str,
        fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>> {
        let names = fields
            .iter()
            .map(|field| format!("\"{}\"", field.label()))
            .collect::<Vec<_>>()
            .join(", ");
        let instructions = format!(
            "You read the text of a vacation-listing page and pull out named attributes.\n\
             Reply with a single JSON object mapping each of these names to its value as a short string: {names}.\n\
             Omit a name when the page does not state it. Never guess."
        );

        let reply = self.json_object_reply(&instructions, text).await?;
        let mut determined = BTreeMap::new();
        if let Some(object) = reply.as_object() {
            for field in fields {
                let Some(value) = object.get(field.label()) else {
                    continue;
                };
                let rendered = match value {
                    serde_json::Value::String(s) => s.trim().to_owned(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                if !rendered.is_empty() {
                    determined.insert(*field, rendered);
                }
            }
        }
        debug!(determined = determined.len(), "classifier field reply");
        Ok(determined)
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// Classifier that never determines anything; keyword matching and the
/// cascade stand alone.
pub struct NoopClassifier;

#[async_trait]
impl SemanticClassifier for NoopClassifier {
    async fn classify_amenities(
        &self,
        _text: &str,
        _vocabulary: &[Amenity],
    ) -> Result<BTreeMap<Amenity, bool>> {
        Ok(BTreeMap::new())
    }

    async fn extract_fields(
        &self,
        _text: &str,
        _fields: &[FieldName],
    ) -> Result<BTreeMap<FieldName, String>> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn error_message_is_pulled_from_the_body() {
        let raw = r#"{"error": {"message": "rate limited"}}"#;
        assert_eq!(parse_error_message(raw), Some("rate limited".to_owned()));
        assert_eq!(parse_error_message("not json"), None);
    }
}
