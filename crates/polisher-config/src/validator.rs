//! Configuration validation.

use polisher_protocols::KnownProvider;

use crate::schema::{PolisherConfig, Settings};

/// Debounce windows outside this range either rescan on every keystroke-sized
/// burst or leave new surfaces bare for too long.
pub const DEBOUNCE_RANGE_MS: (u64, u64) = (200, 500);

/// Accepted interval for the fallback rescan.
pub const RESCAN_INTERVAL_RANGE_MS: (u64, u64) = (3000, 5000);

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the runtime configuration.
    pub fn validate(config: &PolisherConfig) -> ValidationResult {
        let mut result = ValidationResult::default();
        Self::validate_timing(config, &mut result);
        Self::validate_ui(config, &mut result);
        Self::validate_templates(config, &mut result);
        Self::validate_intercept(config, &mut result);
        result
    }

    /// Validate a settings record.
    ///
    /// Missing credentials and unknown providers are warnings: the pipeline
    /// still runs and reports them per invocation as configuration errors.
    pub fn validate_settings(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::default();

        if KnownProvider::parse(&settings.provider).is_none() {
            result.add_warning(ValidationWarning::new(
                "provider",
                format!(
                    "Unknown provider '{}', known providers: {:?}",
                    settings.provider,
                    KnownProvider::ALL.map(|p| p.as_str())
                ),
            ));
        }

        if !settings.has_credential() {
            result.add_warning(ValidationWarning::new(
                "credential",
                "Credential is not set, rewrites will fail until it is configured",
            ));
        }

        if let Some(endpoint) = settings.provider_settings().endpoint {
            match url::Url::parse(&endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => result.add_error(ValidationError::new(
                    "endpoint",
                    "endpoint must use http:// or https://",
                )),
                Err(e) => result.add_error(ValidationError::new(
                    "endpoint",
                    format!("endpoint is not a valid URL: {}", e),
                )),
            }
        }

        result
    }

    fn validate_timing(config: &PolisherConfig, result: &mut ValidationResult) {
        let timing = &config.timing;
        let (min, max) = DEBOUNCE_RANGE_MS;
        if timing.debounce_ms < min || timing.debounce_ms > max {
            result.add_error(ValidationError::new(
                "timing.debounce_ms",
                format!("debounce_ms must be between {} and {}", min, max),
            ));
        }

        if let Some(max_debounce) = timing.max_debounce_ms {
            if max_debounce < timing.debounce_ms {
                result.add_error(ValidationError::new(
                    "timing.max_debounce_ms",
                    "max_debounce_ms cannot be shorter than debounce_ms",
                ));
            }
        }

        let (min, max) = RESCAN_INTERVAL_RANGE_MS;
        if timing.rescan_interval_ms < min || timing.rescan_interval_ms > max {
            result.add_error(ValidationError::new(
                "timing.rescan_interval_ms",
                format!("rescan_interval_ms must be between {} and {}", min, max),
            ));
        }

        if timing.invocation_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "timing.invocation_timeout_secs",
                "invocation_timeout_secs must be greater than 0",
            ));
        } else if timing.invocation_timeout_secs > 120 {
            result.add_warning(ValidationWarning::new(
                "timing.invocation_timeout_secs",
                "invocation_timeout_secs is very high (>120), surfaces stay disabled that long",
            ));
        }
    }

    fn validate_ui(config: &PolisherConfig, result: &mut ValidationResult) {
        if config.ui.affordance_label.trim().is_empty() {
            result.add_error(ValidationError::new(
                "ui.affordance_label",
                "affordance_label cannot be empty",
            ));
        }
        if config.ui.setup_label.trim().is_empty() {
            result.add_error(ValidationError::new(
                "ui.setup_label",
                "setup_label cannot be empty",
            ));
        }
    }

    fn validate_templates(config: &PolisherConfig, result: &mut ValidationResult) {
        let templates = &config.templates;
        if !templates.enabled {
            return;
        }
        if templates.items.is_empty() {
            result.add_warning(ValidationWarning::new(
                "templates.items",
                "Templates are enabled but none are defined",
            ));
        }
        for (i, item) in templates.items.iter().enumerate() {
            if item.label.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("templates.items[{}].label", i),
                    "label cannot be empty",
                ));
            }
            if item.phrase.is_empty() {
                result.add_error(ValidationError::new(
                    format!("templates.items[{}].phrase", i),
                    "phrase cannot be empty",
                ));
            }
        }
    }

    fn validate_intercept(config: &PolisherConfig, result: &mut ValidationResult) {
        let intercept = &config.intercept;
        if intercept.enabled && intercept.button_phrases.iter().any(|p| p.trim().is_empty()) {
            result.add_error(ValidationError::new(
                "intercept.button_phrases",
                "button phrases cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
