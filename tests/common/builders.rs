//! Test data builders for pipeline configurations

use rtt_plot::config::{LogLevel, PipelineConfig, RuntimeSettings, TransportPreference};

/// Builder for runtime settings isolated from other tests
pub struct SettingsBuilder {
    settings: RuntimeSettings,
}

impl SettingsBuilder {
    /// Loopback TCP on a freshly probed port block
    pub fn tcp() -> Self {
        let mut settings = RuntimeSettings::default();
        settings.addressing.transport = TransportPreference::Tcp;
        settings.addressing.base_port = super::free_port_block();
        Self { settings }
    }

    /// Native family with a unique abstract-name namespace
    pub fn native(tag: &str) -> Self {
        let mut settings = RuntimeSettings::default();
        settings.addressing.namespace = Some(super::unique_namespace(tag));
        settings.addressing.base_port = super::free_port_block();
        Self { settings }
    }

    pub fn grace_ms(mut self, grace_ms: u64) -> Self {
        self.settings.shutdown_grace_ms = grace_ms;
        self
    }

    pub fn rate_hz(mut self, rate_hz: u32) -> Self {
        self.settings.capture.rate_hz = rate_hz;
        self
    }

    pub fn refresh_ms(mut self, refresh_ms: u64) -> Self {
        self.settings.presentation.refresh_ms = refresh_ms;
        self
    }

    pub fn build(self) -> RuntimeSettings {
        self.settings
    }

    pub fn config(self, dataset: &str) -> PipelineConfig {
        PipelineConfig::new(dataset, LogLevel::Info, self.settings).unwrap()
    }

    pub fn max_events(mut self, max_events: u64) -> Self {
        self.settings.capture.max_events = Some(max_events);
        self
    }

    pub fn enabled_events(mut self, mask: u32) -> Self {
        self.settings.capture.enabled_events = mask;
        self
    }

    pub fn window_secs(mut self, window_secs: f64) -> Self {
        self.settings.presentation.window_secs = window_secs;
        self
    }

    /// Settings file content understood by `RTT_PLOT_CONFIG`
    pub fn to_toml(&self) -> String {
        self.settings.to_toml().unwrap()
    }
}
