//! Structured replies: models are asked for JSON and often wrap it in prose
//! or code fences.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::provider::{LlmError, LlmProvider, Message};

/// Find the outermost JSON object in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Complete and deserialize the first JSON object in the reply.
pub async fn complete_json<T: DeserializeOwned>(
    provider: &dyn LlmProvider,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
) -> Result<T, LlmError> {
    let reply = provider.complete(messages, temperature, max_tokens).await?;
    let value = extract_json(&reply)
        .ok_or_else(|| LlmError::ParseError(format!("no JSON object in reply: {}", truncate(&reply, 120))))?;
    serde_json::from_value(value).map_err(|e| LlmError::ParseError(e.to_string()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn complete(&self, _: Vec<Message>, _: f32, _: u32) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        fn label(&self) -> String {
            "canned".into()
        }
    }

    #[derive(Debug, Deserialize)]
    struct Reply {
        score: u32,
    }

    #[test]
    fn extracts_from_fenced_reply() {
        let v = extract_json("Here you go:\n```json\n{\"score\": 7}\n```\nThanks").unwrap();
        assert_eq!(v["score"], 7);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} backwards {").is_none());
    }

    #[tokio::test]
    async fn complete_json_parses_reply() {
        let reply: Reply = complete_json(&Canned("{\"score\": 3}"), vec![], 0.0, 10).await.unwrap();
        assert_eq!(reply.score, 3);
    }

    #[tokio::test]
    async fn complete_json_reports_garbage() {
        let err = complete_json::<Reply>(&Canned("I cannot help"), vec![], 0.0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }
}
