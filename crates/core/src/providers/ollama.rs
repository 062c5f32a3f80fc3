use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::traits::TextGenerator;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use url::Url;

const BACKEND: &str = "ollama";

/// Connection details shared by the embedding and generation clients.
#[derive(Debug, Clone)]
pub struct OllamaEndpoint {
    base: Url,
    api_key: Option<String>,
    client: Client,
}

impl OllamaEndpoint {
    pub fn new(base: &str, api_key: Option<String>) -> Result<Self, ServiceError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: Client::new(),
        })
    }

    pub fn url(&self, route: &str) -> Result<Url, ServiceError> {
        Ok(self.base.join(route)?)
    }

    fn post(&self, route: &str, body: &Value) -> Result<RequestBuilder, ServiceError> {
        let mut request = self.client.post(self.url(route)?).json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        Ok(request)
    }

    async fn call(&self, route: &str, body: Value) -> Result<Value, ServiceError> {
        let response = self.post(route, &body)?.send().await?;

        if !response.status().is_success() {
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

pub struct OllamaEmbedder {
    endpoint: OllamaEndpoint,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(endpoint: OllamaEndpoint, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let parsed = self
            .endpoint
            .call(
                "api/embeddings",
                json!({ "model": self.model, "prompt": text }),
            )
            .await?;
        parse_embedding(&parsed)
    }
}

pub struct OllamaGenerator {
    endpoint: OllamaEndpoint,
    model: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: OllamaEndpoint, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let parsed = self
            .endpoint
            .call(
                "api/generate",
                json!({ "model": self.model, "prompt": prompt, "stream": false }),
            )
            .await?;
        parse_completion(&parsed)
    }
}

fn parse_embedding(parsed: &Value) -> Result<Vec<f32>, ServiceError> {
    let values = parsed
        .pointer("/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("embedding"))?;

    values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| missing("numeric embedding values"))
}

fn parse_completion(parsed: &Value) -> Result<String, ServiceError> {
    parsed
        .pointer("/response")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing("response"))
}

fn missing(field: &str) -> ServiceError {
    ServiceError::MalformedResponse {
        backend: BACKEND.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_join_onto_base_paths() {
        let bare = OllamaEndpoint::new("http://localhost:11434", None).unwrap();
        let prefixed = OllamaEndpoint::new("http://gateway:8080/ollama", None).unwrap();

        assert_eq!(
            bare.url("api/generate").unwrap().as_str(),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            prefixed.url("api/embeddings").unwrap().as_str(),
            "http://gateway:8080/ollama/api/embeddings"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            OllamaEndpoint::new("not a url", None),
            Err(ServiceError::Url(_))
        ));
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let endpoint = OllamaEndpoint::new("http://localhost:11434", Some("  ".to_string())).unwrap();
        assert!(endpoint.api_key.is_none());
    }

    #[test]
    fn embedding_payload_is_parsed() {
        let vector = parse_embedding(&json!({ "embedding": [0.5, -1.0, 2] })).unwrap();
        assert_eq!(vector, vec![0.5, -1.0, 2.0]);

        assert!(matches!(
            parse_embedding(&json!({ "embedding": ["x"] })),
            Err(ServiceError::MalformedResponse { .. })
        ));
        assert!(parse_embedding(&json!({ "error": "model not found" })).is_err());
    }

    #[test]
    fn completion_payload_is_parsed() {
        let text = parse_completion(&json!({ "response": "  Chlorophyll.\n", "done": true })).unwrap();
        assert_eq!(text, "  Chlorophyll.\n");
        assert!(parse_completion(&json!({ "done": true })).is_err());
    }
}
