//! Configuration
//!
//! Defaults, then an optional TOML file, then `PTREE_*` environment
//! variables. Credentials never live here: the generator reads the key
//! from the variable named by [`GeneratorConfig::api_key_env`] at call time.

use crate::error::{CoreError, Result};
use ptree_kernel::{LayoutConfig, OrphanPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// System instructions sent with every improvement request
pub const DEFAULT_METAPROMPT: &str = r#"You are an expert prompt engineer. You receive a prompt and the user's feedback on it.
Produce improved versions of the prompt that address the feedback.

Answer only with XML in exactly this shape:

<result>
  <options>
    <option id="improvement-1">
      <text>the complete improved prompt</text>
      <analysis>what this version does better</analysis>
      <changes>
        <change>
          <description>one concrete change</description>
          <rationale>why it helps</rationale>
        </change>
      </changes>
    </option>
  </options>
</result>

Number the options improvement-1, improvement-2 and so on. Do not echo the original prompt as an option."#;

/// External generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// OpenAI-compatible chat completions URL
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Improved versions requested per call
    pub candidate_count: usize,
    /// Token cap for tree naming
    pub name_max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 300,
            candidate_count: 3,
            name_max_tokens: 30,
        }
    }
}

impl GeneratorConfig {
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// ptree configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtreeConfig {
    pub generator: GeneratorConfig,
    pub layout: LayoutConfig,
    /// Quiet period before an edit is autosaved
    pub autosave_debounce_ms: u64,
    pub orphan_policy: OrphanPolicy,
    pub metaprompt: String,
}

impl Default for PtreeConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            layout: LayoutConfig::default(),
            autosave_debounce_ms: 500,
            orphan_policy: OrphanPolicy::Drop,
            metaprompt: DEFAULT_METAPROMPT.to_string(),
        }
    }
}

impl PtreeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_autosave_debounce_ms(mut self, ms: u64) -> Self {
        self.autosave_debounce_ms = ms;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_metaprompt(mut self, metaprompt: impl Into<String>) -> Self {
        self.metaprompt = metaprompt.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Overlay `PTREE_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(endpoint) = lookup("PTREE_GENERATOR_ENDPOINT") {
            self.generator.endpoint = endpoint;
        }
        if let Some(model) = lookup("PTREE_GENERATOR_MODEL") {
            self.generator.model = model;
        }
        if let Some(ms) = lookup("PTREE_AUTOSAVE_MS") {
            self.autosave_debounce_ms = ms
                .trim()
                .parse()
                .map_err(|e| CoreError::Config(format!("PTREE_AUTOSAVE_MS={ms:?}: {e}")))?;
        }
        Ok(self)
    }
}
