//! Process-wide binding configuration

use parking_lot::RwLock;

/// Locale id meaning "system default".
pub const LOCALE_SYSTEM_DEFAULT: u32 = 0x0800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    /// Locale passed to `lcid` parameters and to `IDispatch` calls.
    pub lcid: u32,
    /// Consult `ISupportErrorInfo` and the thread's error record on failure.
    pub extended_errors: bool,
    /// Emit a trace event for every native call.
    pub trace_calls: bool,
}

impl BindingConfig {
    pub fn builder() -> BindingConfigBuilder {
        BindingConfigBuilder::new()
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            lcid: 0,
            extended_errors: true,
            trace_calls: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindingConfigBuilder {
    inner: BindingConfig,
}

impl BindingConfigBuilder {
    pub fn new() -> Self {
        Self {
            inner: BindingConfig::default(),
        }
    }

    pub fn lcid(mut self, lcid: u32) -> Self {
        self.inner.lcid = lcid;
        self
    }

    pub fn extended_errors(mut self, enabled: bool) -> Self {
        self.inner.extended_errors = enabled;
        self
    }

    pub fn trace_calls(mut self, enabled: bool) -> Self {
        self.inner.trace_calls = enabled;
        self
    }

    pub fn build(self) -> BindingConfig {
        self.inner
    }
}

impl Default for BindingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

static CONFIG: RwLock<Option<BindingConfig>> = RwLock::new(None);

/// Replace the active configuration.
pub fn install_config(config: BindingConfig) {
    *CONFIG.write() = Some(config);
}

/// Snapshot of the active configuration.
pub fn config() -> BindingConfig {
    CONFIG.read().clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let cfg = BindingConfig::builder()
            .lcid(LOCALE_SYSTEM_DEFAULT)
            .extended_errors(false)
            .trace_calls(true)
            .build();
        assert_eq!(cfg.lcid, 0x0800);
        assert!(!cfg.extended_errors);
        assert!(cfg.trace_calls);
        assert!(BindingConfig::default().extended_errors);
    }
}
