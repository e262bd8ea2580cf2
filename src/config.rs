use std::time::Duration;

/// What to do when a `then` statement fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorPolicy {
    /// Run the remaining statements of the rule.
    #[default]
    Continue,
    /// Skip the rest of the failing rule.
    AbortRule,
    /// Skip the rest of the failing rule and the `then` blocks of the
    /// stage's remaining matched rules.
    AbortStage,
}

/// Settings for building processing state and running pipelines.
///
/// With the `serde` feature the config can be read from TOML; every key is
/// optional.
///
/// ```toml
/// on_statement_error = "abort_rule"
/// generate_code = true
/// rule_metrics = false
/// processing_error_field = "gl2_processing_error"
/// message_budget_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct InterpreterConfig {
    pub on_statement_error: ErrorPolicy,
    pub generate_code: bool,
    pub rule_metrics: bool,
    pub processing_error_field: Option<String>,
    pub message_budget_ms: Option<u64>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            on_statement_error: ErrorPolicy::Continue,
            generate_code: true,
            rule_metrics: true,
            processing_error_field: Some("processing_error".to_owned()),
            message_budget_ms: None,
        }
    }
}

impl InterpreterConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_statement_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_statement_error = policy;
        self
    }

    #[must_use]
    pub fn with_generated_code(mut self, enabled: bool) -> Self {
        self.generate_code = enabled;
        self
    }

    #[must_use]
    pub fn with_rule_metrics(mut self, enabled: bool) -> Self {
        self.rule_metrics = enabled;
        self
    }

    /// Field collecting evaluation errors on the message; `None` disables it.
    #[must_use]
    pub fn with_processing_error_field(mut self, field: Option<&str>) -> Self {
        self.processing_error_field = field.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn with_message_budget(mut self, budget: Duration) -> Self {
        self.message_budget_ms = Some(u64::try_from(budget.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn message_budget(&self) -> Option<Duration> {
        self.message_budget_ms.map(Duration::from_millis)
    }

    /// Parse a config from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or unknown keys.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }
}

/// Failure to read an [`InterpreterConfig`].
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
#[error("invalid interpreter config: {0}")]
pub struct ConfigError(#[from] toml::de::Error);
