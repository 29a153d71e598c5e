use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::config::{VertexConfig, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::error::{ConfigError, ProviderError};
use crate::types::Message;
use crate::util::http;

use super::google_auth::{ServiceAccountKey, TokenSource, CLOUD_PLATFORM_SCOPE};
use super::{latest_text, LlmProvider};

/// Vertex AI prediction endpoint. Only the newest message is sent; the
/// endpoint sees no conversation history.
pub struct VertexPredictionProvider {
    api_base: String,
    project_id: String,
    location: String,
    endpoint_id: Option<String>,
    tokens: Arc<TokenSource>,
}

impl VertexPredictionProvider {
    pub fn new(
        tokens: Arc<TokenSource>,
        project_id: String,
        location: String,
        endpoint_id: Option<String>,
        api_base: Option<String>,
    ) -> Self {
        let base = api_base
            .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com/v1"));
        Self {
            api_base: base.trim_end_matches('/').to_string(),
            project_id,
            location,
            endpoint_id,
            tokens,
        }
    }

    /// Load the service-account key and resolve the project id.
    pub fn from_config(config: &VertexConfig) -> Result<Self, ConfigError> {
        let key = ServiceAccountKey::from_file(&config.credentials_path)?;
        let project_id = config
            .project_id
            .clone()
            .or_else(|| key.project_id.clone())
            .ok_or_else(|| ConfigError::Invalid {
                key: "VERTEX_PROJECT_ID",
                message: "not set and the credentials file has no project_id".to_string(),
            })?;
        let tokens = Arc::new(TokenSource::new(key, CLOUD_PLATFORM_SCOPE));
        Ok(Self::new(
            tokens,
            project_id,
            config.location.clone(),
            config.endpoint_id.clone(),
            None,
        ))
    }

    /// Fully qualified endpoint resource name.
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint_id.as_ref().map(|id| {
            format!(
                "projects/{}/locations/{}/endpoints/{}",
                self.project_id, self.location, id
            )
        })
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        json!({
            "instances": [{"content": prompt}],
            "parameters": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for VertexPredictionProvider {
    fn name(&self) -> &str {
        "vertex"
    }

    async fn generate(&self, history: &[Message]) -> Result<String, ProviderError> {
        let endpoint = self
            .endpoint()
            .ok_or_else(|| ProviderError::NotConfigured("VERTEX_ENDPOINT_ID is not set".to_string()))?;
        let url = format!("{}/{}:predict", self.api_base, endpoint);
        let prompt = latest_text(history);

        let token = self.tokens.access_token().await?;

        debug!("Vertex predict request to {}", endpoint);

        let response = http::client()
            .post(&url)
            .bearer_auth(token)
            .json(&Self::request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_prediction(&data)
    }
}

/// Extract the first prediction, which is either a bare string or an object
/// with a `content` field.
pub fn parse_prediction(data: &serde_json::Value) -> Result<String, ProviderError> {
    let first = match data.get("predictions").and_then(|p| p.as_array()) {
        Some(predictions) if !predictions.is_empty() => &predictions[0],
        _ => return Err(ProviderError::EmptyResponse),
    };

    let text = match first {
        serde_json::Value::String(s) => s.as_str(),
        other => other
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse("Prediction has no content".to_string()))?,
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = include_str!("../../tests/fixtures/service_account.json");

    async fn provider_for(server: &MockServer, endpoint_id: Option<&str>) -> VertexPredictionProvider {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.vertex",
                "expires_in": 3600
            })))
            .mount(server)
            .await;

        let mut key = ServiceAccountKey::from_json(FIXTURE).unwrap();
        key.token_uri = format!("{}/token", server.uri());
        VertexPredictionProvider::new(
            Arc::new(TokenSource::new(key, CLOUD_PLATFORM_SCOPE)),
            "duobot-test".into(),
            "us-central1".into(),
            endpoint_id.map(str::to_string),
            Some(format!("{}/v1", server.uri())),
        )
    }

    #[test]
    fn test_parse_string_prediction() {
        let data = json!({"predictions": ["  a cat in a hat  "]});
        assert_eq!(parse_prediction(&data).unwrap(), "a cat in a hat");
    }

    #[test]
    fn test_parse_object_prediction() {
        let data = json!({"predictions": [{"content": "sunset\n"}, {"content": "ignored"}]});
        assert_eq!(parse_prediction(&data).unwrap(), "sunset");
    }

    #[test]
    fn test_parse_no_predictions() {
        assert!(matches!(
            parse_prediction(&json!({"predictions": []})),
            Err(ProviderError::EmptyResponse)
        ));
        assert!(matches!(
            parse_prediction(&json!({})),
            Err(ProviderError::EmptyResponse)
        ));
        assert!(matches!(
            parse_prediction(&json!({"predictions": [{"safetyAttributes": {}}]})),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let body = VertexPredictionProvider::request_body("draw a cat");
        assert_eq!(body["instances"][0]["content"], "draw a cat");
        assert_eq!(body["parameters"]["temperature"], 0.7);
        assert_eq!(body["parameters"]["maxOutputTokens"], 1000);
    }

    #[tokio::test]
    async fn test_generate_sends_latest_message_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v1/projects/duobot-test/locations/us-central1/endpoints/42:predict",
            ))
            .and(header("authorization", "Bearer ya29.vertex"))
            .and(body_json(VertexPredictionProvider::request_body("draw me a picture")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"predictions": ["a picture"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, Some("42")).await;
        let history = vec![
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("draw me a picture"),
        ];
        assert_eq!(provider.generate(&history).await.unwrap(), "a picture");
    }

    #[tokio::test]
    async fn test_generate_without_endpoint() {
        let server = MockServer::start().await;
        let provider = provider_for(&server, None).await;
        assert!(matches!(
            provider.generate(&[Message::user("draw")]).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_from_config_uses_key_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let provider = VertexPredictionProvider::from_config(&VertexConfig {
            credentials_path: path,
            project_id: None,
            location: "europe-west4".into(),
            endpoint_id: Some("7".into()),
        })
        .unwrap();
        assert_eq!(
            provider.endpoint().as_deref(),
            Some("projects/duobot-test/locations/europe-west4/endpoints/7")
        );
        assert_eq!(provider.api_base, "https://europe-west4-aiplatform.googleapis.com/v1");
    }
}
