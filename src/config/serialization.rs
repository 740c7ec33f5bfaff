//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;
use serde::Serialize;

/// TOML string literal for `s`, escaped as needed
fn toml_string(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

/// TOML rendering of a unit enum such as `LogRotation`
fn toml_enum<T: Serialize>(value: &T) -> String {
    toml::Value::try_from(value)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| toml_string(""))
}

impl Config {
    /// Serialize config to a commented TOML string
    ///
    /// Every string value goes through `toml`, so quotes and backslashes in
    /// paths or provider names still load back.
    pub fn to_toml(&self) -> String {
        format!(
            r#"# privlens configuration

# Analysis history database (":memory:" keeps history in-process only)
db_path = {db_path}

# AI provider for questions: "auto", "offline", or a named provider
preferred_api_provider = {provider}

# When a record id is reused: "overwrite" replaces, "append" keeps both
duplicate_policy = "{duplicate_policy}"

# Request queue depth in front of the background
channel_buffer = {channel_buffer}

# Seconds to wait for a reply before giving up (0 = wait indefinitely)
request_timeout_secs = {timeout}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# JSON file logging (in addition to stderr)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = {log_file_rotation}  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            db_path = toml_string(&self.db_path.display().to_string()),
            provider = toml_string(&self.preferred_api_provider),
            duplicate_policy = self.duplicate_policy.as_str(),
            channel_buffer = self.channel_buffer,
            timeout = self.request_timeout_secs,
            log_level = toml_string(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = toml_string(&self.logging.file_dir.display().to_string()),
            log_file_rotation = toml_enum(&self.logging.file_rotation),
            log_file_prefix = toml_string(&self.logging.file_prefix),
        )
    }
}
