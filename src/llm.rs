use std::time::Duration;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use crate::{config::{Config, RequestOptions}, error::ClientError, message::ChatMessage};

/// The operations this tool needs from a model server.
pub trait InferenceService {
    fn list_models(&self) -> Result<ModelListing, ClientError>;
    fn pull_model(&self, model: &str) -> Result<(), ClientError>;
    fn chat(&self, model: &str, messages: &[ChatMessage], options: &RequestOptions) -> Result<String, ClientError>;
}

/// Model registry response. Older servers wrap the entries in `models`, some
/// proxies return the bare list, and anything else is scanned for a list of
/// named entries.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ModelListing {
    Wrapped { models: Vec<ModelEntry> },
    Bare(Vec<ModelEntry>),
    Other(Map<String, Value>),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ModelEntry {
    #[serde(default)]
    pub name: Option<String>,
}

impl ModelListing {
    pub fn names(&self) -> Vec<String> {
        match self {
            ModelListing::Wrapped { models } | ModelListing::Bare(models) => {
                models.iter().filter_map(|m| m.name.clone()).collect()
            }
            ModelListing::Other(map) => map
                .values()
                .filter_map(Value::as_array)
                .find(|items| items.first().and_then(|first| first.get("name")).is_some())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ModelListing::Other(_))
    }
}

/// `llama3` matches `llama3` and any tagged variant such as `llama3:8b`.
pub fn model_matches(wanted: &str, available: &str) -> bool {
    available == wanted
        || available
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':'))
}

pub struct OllamaClient {
    http: Client,
    host: String,
    timeout: Duration,
}

impl OllamaClient {
    /// `timeout` bounds listing and chat requests. Pulls are not bounded.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(None::<Duration>).build()?;
        Ok(OllamaClient { http, host: host.into(), timeout })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(config.api_host(), Duration::from_secs(config.script_settings.timeout))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.host, path)
    }
}

fn check_status(res: Response) -> Result<Response, ClientError> {
    if res.status().is_success() {
        Ok(res)
    } else {
        let status = res.status().as_u16();
        let body = res.text().unwrap_or_default();
        Err(ClientError::Status { status, body })
    }
}

impl InferenceService for OllamaClient {
    fn list_models(&self) -> Result<ModelListing, ClientError> {
        let res = self.http.get(self.url("tags")).timeout(self.timeout).send()?;
        let json: Value = check_status(res)?.json()?;
        serde_json::from_value(json).map_err(|e| ClientError::Decode(format!("model listing: {}", e)))
    }

    fn pull_model(&self, model: &str) -> Result<(), ClientError> {
        let res = self
            .http
            .post(self.url("pull"))
            .json(&serde_json::json!({ "model": model, "stream": false }))
            .send()?;
        let json: Value = check_status(res)?.json()?;
        match json.get("error").and_then(Value::as_str) {
            Some(error) => Err(ClientError::Decode(format!("pull failed: {}", error))),
            None => Ok(()),
        }
    }

    fn chat(&self, model: &str, messages: &[ChatMessage], options: &RequestOptions) -> Result<String, ClientError> {
        let res = self
            .http
            .post(self.url("chat"))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "options": options,
            }))
            .send()?;
        let json: Value = check_status(res)?.json()?;
        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("chat response has no message content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> ModelListing {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_wrapped_listing() {
        let listing = decode(json!({"models": [{"name": "llama3:latest", "size": 1}, {"name": "qwen2:7b"}]}));
        assert!(listing.is_recognized());
        assert_eq!(listing.names(), vec!["llama3:latest", "qwen2:7b"]);
    }

    #[test]
    fn test_bare_listing_skips_unnamed() {
        let listing = decode(json!([{"name": "phi3"}, {"digest": "abc"}]));
        assert!(matches!(listing, ModelListing::Bare(_)));
        assert_eq!(listing.names(), vec!["phi3"]);
    }

    #[test]
    fn test_fallback_scan() {
        let listing = decode(json!({"count": 2, "empty": [], "data": [{"name": "mistral"}, {"name": "gemma:2b"}]}));
        assert!(!listing.is_recognized());
        assert_eq!(listing.names(), vec!["mistral", "gemma:2b"]);

        // The first matching list in document order wins, not the first by key name.
        let listing: ModelListing =
            serde_json::from_str(r#"{"zeta": [{"name": "llama3"}], "alpha": [{"name": "other"}]}"#).unwrap();
        assert_eq!(listing.names(), vec!["llama3"]);

        let listing = decode(json!({"data": [{"id": "mistral"}]}));
        assert!(listing.names().is_empty());
    }

    #[test]
    fn test_non_listing_is_an_error() {
        assert!(serde_json::from_value::<ModelListing>(json!("nope")).is_err());
    }

    #[test]
    fn test_model_matches() {
        assert!(model_matches("llama3", "llama3"));
        assert!(model_matches("llama3", "llama3:latest"));
        assert!(model_matches("llama3:8b", "llama3:8b"));
        assert!(!model_matches("llama3", "llama3.1:latest"));
        assert!(!model_matches("llama3:8b", "llama3:70b"));
        assert!(!model_matches("llama", "llama3"));
    }
}
