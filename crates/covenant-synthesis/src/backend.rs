// crates/covenant-synthesis/src/backend.rs
// ============================================================================
// Module: Model Backends
// Description: Uniform model-call contract and its HTTP and test adapters.
// Purpose: Treat models as opaque generators behind one async capability.
// Dependencies: covenant-core, reqwest, serde_json, url, async-trait
// ============================================================================

//! ## Overview
//! Models are opaque: every backend exposes `generate(prompt, context)` and
//! returns the uniform response record (content, confidence, compliance,
//! bias scores, latency). The HTTP adapter posts the request to a
//! configured endpoint with strict scheme and size policy; the scripted
//! adapter drives tests with deterministic responses, delays, and failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use covenant_core::BiasDimension;
use covenant_core::BiasVector;
use covenant_core::ModelId;
use covenant_core::ModelResponse;
use covenant_core::interfaces::SynthesisError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Backend Trait
// ============================================================================

/// Uniform model capability.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> ModelId;

    /// Generates content for a prompt and structured context.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Backend`] when the model call fails; the
    /// coordinator treats a failed model as non-responsive.
    async fn generate(
        &self,
        prompt: &str,
        context: &Map<String, Value>,
    ) -> Result<ModelResponse, SynthesisError>;
}

// ============================================================================
// SECTION: HTTP Backend
// ============================================================================

/// Configuration for the HTTP model backend.
///
/// # Invariants
/// - `endpoint` is HTTPS unless `allow_http` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpModelConfig {
    /// Model identifier reported on responses.
    pub model_id: String,
    /// Generation endpoint.
    pub endpoint: String,
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpModelConfig {
    fn default() -> Self {
        Self {
            model_id: "model".to_string(),
            endpoint: String::new(),
            allow_http: false,
            timeout_ms: 10_000,
            user_agent: "covenant/0.1".to_string(),
        }
    }
}

/// Wire request posted to a model endpoint.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    /// Prompt text.
    prompt: &'a str,
    /// Structured prompt context.
    context: &'a Map<String, Value>,
}

/// Wire response expected from a model endpoint.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    /// Generated content.
    content: String,
    /// Model self-reported confidence.
    confidence: f64,
    /// Constitutional compliance score.
    compliance: f64,
    /// Per-dimension bias scores keyed by dimension label.
    #[serde(default)]
    bias_scores: Map<String, Value>,
}

/// HTTP adapter for a remote model endpoint.
pub struct HttpModelBackend {
    /// Backend configuration.
    config: HttpModelConfig,
    /// Validated endpoint URL.
    endpoint: Url,
    /// HTTP client for outbound calls.
    client: reqwest::Client,
}

impl HttpModelBackend {
    /// Creates an HTTP backend, validating endpoint policy.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Backend`] for an invalid endpoint or a
    /// client build failure.
    pub fn new(config: HttpModelConfig) -> Result<Self, SynthesisError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| SynthesisError::Backend("invalid model endpoint".to_string()))?;
        match endpoint.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            _ => {
                return Err(SynthesisError::Backend(
                    "unsupported model endpoint scheme".to_string(),
                ));
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|_| SynthesisError::Backend("http client build failed".to_string()))?;
        Ok(Self {
            config,
            endpoint,
            client,
        })
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    fn model_id(&self) -> ModelId {
        ModelId::new(self.config.model_id.clone())
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &Map<String, Value>,
    ) -> Result<ModelResponse, SynthesisError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                prompt,
                context,
            })
            .send()
            .await
            .map_err(|err| SynthesisError::Backend(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SynthesisError::Backend(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }
        let body: GenerateResponse =
            response.json().await.map_err(|err| SynthesisError::Backend(err.to_string()))?;
        let latency_millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(ModelResponse {
            model_id: self.model_id(),
            content: body.content,
            confidence: body.confidence.clamp(0.0, 1.0),
            compliance: body.compliance.clamp(0.0, 1.0),
            bias: decode_bias(&body.bias_scores),
            latency_millis,
        })
    }
}

/// Decodes wire bias scores into a bias vector, ignoring unknown labels.
fn decode_bias(scores: &Map<String, Value>) -> BiasVector {
    let mut bias = BiasVector::default();
    for dimension in BiasDimension::ALL {
        if let Some(score) = scores.get(dimension.as_str()).and_then(Value::as_f64) {
            bias.scores.insert(dimension, score.clamp(0.0, 1.0));
        }
    }
    bias
}

// ============================================================================
// SECTION: Scripted Backend
// ============================================================================

/// Deterministic backend for tests and local runs.
///
/// # Invariants
/// - Responses are returned as configured, after the configured delay.
pub struct ScriptedBackend {
    /// Model identifier.
    pub model_id: ModelId,
    /// Content returned on success.
    pub content: String,
    /// Confidence score.
    pub confidence: f64,
    /// Compliance score.
    pub compliance: f64,
    /// Bias scores attached to responses.
    pub bias: BiasVector,
    /// Artificial response delay.
    pub delay: Duration,
    /// When set, every call fails with this message.
    pub fail_with: Option<String>,
}

impl ScriptedBackend {
    /// Creates a well-behaved scripted backend.
    #[must_use]
    pub fn new(model_id: &str, content: &str, confidence: f64, compliance: f64) -> Self {
        Self {
            model_id: ModelId::new(model_id),
            content: content.to_string(),
            confidence,
            compliance,
            bias: BiasVector::default(),
            delay: Duration::ZERO,
            fail_with: None,
        }
    }

    /// Sets per-dimension bias scores.
    #[must_use]
    pub fn with_bias(mut self, dimension: BiasDimension, score: f64) -> Self {
        self.bias.scores.insert(dimension, score);
        self
    }

    /// Sets an artificial response delay.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every call fail.
    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn model_id(&self) -> ModelId {
        self.model_id.clone()
    }

    async fn generate(
        &self,
        _prompt: &str,
        _context: &Map<String, Value>,
    ) -> Result<ModelResponse, SynthesisError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(SynthesisError::Backend(message.clone()));
        }
        Ok(ModelResponse {
            model_id: self.model_id.clone(),
            content: self.content.clone(),
            confidence: self.confidence,
            compliance: self.compliance,
            bias: self.bias.clone(),
            latency_millis: u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use serde_json::json;

    use super::HttpModelBackend;
    use super::HttpModelConfig;
    use super::decode_bias;
    use covenant_core::BiasDimension;

    #[test]
    fn cleartext_endpoints_are_rejected_by_default() {
        let config = HttpModelConfig {
            endpoint: "http://models.internal/generate".to_string(),
            ..HttpModelConfig::default()
        };
        assert!(HttpModelBackend::new(config).is_err());

        let permitted = HttpModelConfig {
            endpoint: "http://models.internal/generate".to_string(),
            allow_http: true,
            ..HttpModelConfig::default()
        };
        assert!(HttpModelBackend::new(permitted).is_ok());
    }

    #[test]
    fn https_endpoints_build_and_malformed_urls_fail() {
        let secure = HttpModelConfig {
            endpoint: "https://models.internal/generate".to_string(),
            ..HttpModelConfig::default()
        };
        assert!(HttpModelBackend::new(secure).is_ok());

        let malformed = HttpModelConfig {
            endpoint: "not a url".to_string(),
            ..HttpModelConfig::default()
        };
        assert!(HttpModelBackend::new(malformed).is_err());
    }

    #[test]
    fn wire_bias_scores_decode_with_clamping_and_unknown_keys_ignored() {
        let mut scores = Map::new();
        scores.insert("demographic".to_string(), json!(1.7));
        scores.insert("cultural".to_string(), json!(0.2));
        scores.insert("made_up_dimension".to_string(), json!(0.9));
        let bias = decode_bias(&scores);
        assert!((bias.score(BiasDimension::Demographic) - 1.0).abs() < f64::EPSILON);
        assert!((bias.score(BiasDimension::Cultural) - 0.2).abs() < f64::EPSILON);
        assert!(bias.score(BiasDimension::Linguistic).abs() < f64::EPSILON);
    }
}
