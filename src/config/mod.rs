//! Background scheduler configuration.
//!
//! [`SchedulerConfig`] can be built in code with the builder-style setters or
//! deserialized from the plugin's JSON settings; missing fields fall back to
//! their defaults.

use serde::Deserialize;

/// Name given to the background thread unless configured otherwise.
pub const DEFAULT_THREAD_NAME: &str = "plugbridge-loop";

/// Settings for the single background scheduler thread.
///
/// # Examples
///
/// ```
/// use plugbridge::config::SchedulerConfig;
///
/// let config = SchedulerConfig::from_json(r#"{ "thread_name": "lsp-loop" }"#).unwrap();
/// assert_eq!(config.name(), "lsp-loop");
/// assert_eq!(config.stack_size(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    thread_name: String,
    thread_stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            thread_stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if the document is not valid JSON or
    /// a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the name of the background thread.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the stack size, in bytes, of the background thread.
    #[must_use]
    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Returns the configured thread name.
    pub fn name(&self) -> &str {
        &self.thread_name
    }

    /// Returns the configured stack size, if any.
    pub fn stack_size(&self) -> Option<usize> {
        self.thread_stack_size
    }
}
