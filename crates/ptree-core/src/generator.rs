//! Generator collaborator
//!
//! The core only ever sees raw text from the generator; all structure is
//! recovered by the response parser. [`OpenAiGenerator`] talks to any
//! OpenAI-compatible chat completions endpoint.
//!
//! Besides improvement and naming, a generator can run a prompt as is
//! with caller-chosen sampling settings, so a candidate can be tried out
//! before it is refined further.

use crate::config::GeneratorConfig;
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use ptree_model::Feedback;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

const NAMING_INSTRUCTIONS: &str = "Generate a 2-5 word title that captures what this prompt chain accomplishes. \
Return only the title in title case. Do not include any other text or quotes.";

/// Source of improved prompt text
#[async_trait]
pub trait Generator: Send + Sync {
    /// Ask for improved versions of `prompt`, given the feedback left on it
    async fn generate(&self, system: &str, prompt: &str, feedback: &[Feedback]) -> Result<String>;

    /// Ask for a short title for a tree
    async fn name_tree(&self, initial_prompt: &str, analyses: &[String]) -> Result<String>;

    /// Send `prompt` as the only user message and return the completion
    async fn run(&self, prompt: &str, params: &SamplingParams) -> Result<String>;
}

/// Per-call sampling overrides
///
/// Unset model and temperature fall back to the configured ones; the
/// other unset fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplingParams {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

impl SamplingParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn with_penalties(mut self, frequency: f32, presence: f32) -> Self {
        self.frequency_penalty = Some(frequency);
        self.presence_penalty = Some(presence);
        self
    }
}

/// User message for an improvement request
pub fn improvement_request(prompt: &str, feedback: &[Feedback], candidate_count: usize) -> Result<String> {
    let feedback = serde_json::to_string(feedback)?;
    Ok(format!(
        "Please improve the following prompt based on this feedback: {feedback}\n\n\
         Prompt: {prompt}\n\n\
         Provide exactly {candidate_count} different improved versions."
    ))
}

/// User message for a naming request
#[must_use]
pub fn naming_request(initial_prompt: &str, analyses: &[String]) -> String {
    format!(
        "Generate a name for a prompt improvement chain. The initial prompt is: \"{initial_prompt}\". \
         The chain has {} improvements focusing on: {}",
        analyses.len(),
        analyses.join(", ")
    )
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Chat-completions client
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CoreError::Config(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.config.api_key_env)
            .map_err(|_| CoreError::Config(format!("{} is not set", self.config.api_key_env)))
    }

    /// Chat-completions request body for `messages`
    fn request_body(&self, messages: Value, params: &SamplingParams) -> Value {
        let mut body = json!({
            "model": params.model.as_deref().unwrap_or(&self.config.model),
            "messages": messages,
            "temperature": params.temperature.unwrap_or(self.config.temperature),
        });
        let optional = [
            ("max_tokens", params.max_tokens.map(Value::from)),
            ("top_p", params.top_p.map(Value::from)),
            ("frequency_penalty", params.frequency_penalty.map(Value::from)),
            ("presence_penalty", params.presence_penalty.map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body[key] = value;
            }
        }
        body
    }

    async fn chat(&self, system: &str, user: &str, params: &SamplingParams) -> Result<String> {
        let messages = json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user}
        ]);
        self.complete(self.request_body(messages, params)).await
    }

    async fn complete(&self, body: Value) -> Result<String> {
        debug!(model = %body["model"], endpoint = %self.config.endpoint, "calling generator");
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, "generator call failed");
            return Err(CoreError::transport(format!("generator returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CoreError::transport("generator returned no message body"))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, system: &str, prompt: &str, feedback: &[Feedback]) -> Result<String> {
        let user = improvement_request(prompt, feedback, self.config.candidate_count)?;
        self.chat(system, &user, &SamplingParams::default()).await
    }

    async fn name_tree(&self, initial_prompt: &str, analyses: &[String]) -> Result<String> {
        let user = naming_request(initial_prompt, analyses);
        let params = SamplingParams::new().with_max_tokens(self.config.name_max_tokens);
        self.chat(NAMING_INSTRUCTIONS, &user, &params)
            .await
            .map(|name| name.trim().to_string())
    }

    async fn run(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let messages = json!([{"role": "user", "content": prompt}]);
        self.complete(self.request_body(messages, params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_request_embeds_feedback_json() {
        let feedback = vec![Feedback::new("too verbose")];
        let message = improvement_request("Summarize this article", &feedback, 3).unwrap();

        assert!(message.starts_with("Please improve the following prompt based on this feedback: [{"));
        assert!(message.contains("\"text\":\"too verbose\""));
        assert!(message.contains("\n\nPrompt: Summarize this article\n\n"));
        assert!(message.ends_with("Provide exactly 3 different improved versions."));
    }

    #[test]
    fn naming_request_lists_analyses() {
        let message = naming_request("p", &["shorter".into(), "bulleted".into()]);
        assert!(message.contains("The chain has 2 improvements focusing on: shorter, bulleted"));
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let config = GeneratorConfig {
            api_key_env: "PTREE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..GeneratorConfig::default()
        };
        let generator = OpenAiGenerator::new(config).unwrap();
        assert!(matches!(generator.api_key(), Err(CoreError::Config(_))));
    }

    #[test]
    fn request_body_falls_back_to_config() {
        let generator = OpenAiGenerator::new(GeneratorConfig::default()).unwrap();
        let body = generator.request_body(json!([]), &SamplingParams::default());

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["temperature"], json!(0.7_f32));
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("presence_penalty").is_none());
    }

    #[test]
    fn request_body_carries_sampling_overrides() {
        let generator = OpenAiGenerator::new(GeneratorConfig::default()).unwrap();
        let params = SamplingParams::new()
            .with_model("gpt-4o-mini")
            .with_temperature(0.0)
            .with_max_tokens(256)
            .with_top_p(0.5)
            .with_penalties(0.25, 1.0);
        let body = generator.request_body(json!([{"role": "user", "content": "hi"}]), &params);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], json!(0.0_f32));
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["top_p"], json!(0.5_f32));
        assert_eq!(body["frequency_penalty"], json!(0.25_f32));
        assert_eq!(body["presence_penalty"], json!(1.0_f32));
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn sampling_params_read_camel_case() {
        let params: SamplingParams =
            serde_json::from_str(r#"{"model":"m","maxTokens":100,"topP":0.9,"frequencyPenalty":0.5}"#).unwrap();
        assert_eq!(params.model.as_deref(), Some("m"));
        assert_eq!(params.max_tokens, Some(100));
        assert_eq!(params.top_p, Some(0.9));
        assert_eq!(params.frequency_penalty, Some(0.5));
        assert!(params.presence_penalty.is_none());
    }

    #[test]
    fn chat_response_tolerates_null_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
