use serde::{Deserialize, Serialize};

/// How chatty the dispatcher is about successful calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    /// Log every call and completion at `info`.
    #[default]
    Full,
    /// Log calls at `debug` only. Failures are always logged.
    Quiet,
}

impl LoggingMode {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Trace text beyond this many characters is dropped.
pub const DEFAULT_TRACE_LIMIT: usize = 10_000;

/// Dispatcher settings.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Enforce the `any`/`named`/`admin` tiers. `disabled` is enforced
    /// regardless.
    pub use_users: bool,
    pub logging_mode: LoggingMode,
    pub trace_limit: usize,
    /// Host name stamped on exception reports.
    pub host: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            use_users: false,
            logging_mode: LoggingMode::Full,
            trace_limit: DEFAULT_TRACE_LIMIT,
            host: local_host_name(),
        }
    }
}

/// Best-effort host name from the environment.
pub fn local_host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DispatchConfig::default();
        assert!(!config.use_users);
        assert!(config.logging_mode.is_full());
        assert_eq!(config.trace_limit, 10_000);
        assert!(!config.host.is_empty());
    }

    #[test]
    fn logging_mode_serde() {
        let mode: LoggingMode = serde_json::from_str("\"quiet\"").unwrap();
        assert_eq!(mode, LoggingMode::Quiet);
        assert_eq!(serde_json::to_string(&LoggingMode::Full).unwrap(), "\"full\"");
    }
}
