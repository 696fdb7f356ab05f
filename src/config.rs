use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Sleep between two polling cycles
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl TelegramConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// getUpdates holds the connection for the long-poll timeout before the
    /// request timeout starts to matter.
    pub fn long_poll_request_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs + self.request_timeout_secs)
    }
}

/// LED control server.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// PWM parameters of the servo. Defaults match an SG90 on a 13-bit 50 Hz channel.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServoConfig {
    #[serde(default = "default_min_pulse_us")]
    pub min_pulse_us: u32,
    #[serde(default = "default_max_pulse_us")]
    pub max_pulse_us: u32,
    #[serde(default = "default_period_us")]
    pub period_us: u32,
    #[serde(default = "default_duty_resolution_bits")]
    pub duty_resolution_bits: u32,
    #[serde(default = "default_sweep_step_degrees")]
    pub sweep_step_degrees: u8,
    #[serde(default = "default_sweep_step_delay_ms")]
    pub sweep_step_delay_ms: u64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_pulse_us: default_min_pulse_us(),
            max_pulse_us: default_max_pulse_us(),
            period_us: default_period_us(),
            duty_resolution_bits: default_duty_resolution_bits(),
            sweep_step_degrees: default_sweep_step_degrees(),
            sweep_step_delay_ms: default_sweep_step_delay_ms(),
        }
    }
}

impl ServoConfig {
    /// Largest duty value the channel accepts at the configured resolution.
    pub fn max_duty(&self) -> u32 {
        (1u32 << self.duty_resolution_bits) - 1
    }
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    10
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_min_pulse_us() -> u32 {
    500
}

fn default_max_pulse_us() -> u32 {
    2500
}

fn default_period_us() -> u32 {
    20_000
}

fn default_duty_resolution_bits() -> u32 {
    13
}

fn default_sweep_step_degrees() -> u8 {
    10
}

fn default_sweep_step_delay_ms() -> u64 {
    15
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if self.telegram.queue_capacity == 0 {
            anyhow::bail!("telegram.queue_capacity must be greater than zero");
        }

        let servo = &self.servo;
        if servo.min_pulse_us >= servo.max_pulse_us {
            anyhow::bail!(
                "servo.min_pulse_us ({}) must be lower than servo.max_pulse_us ({})",
                servo.min_pulse_us,
                servo.max_pulse_us
            );
        }
        if servo.max_pulse_us > servo.period_us {
            anyhow::bail!(
                "servo.max_pulse_us ({}) exceeds the PWM period ({})",
                servo.max_pulse_us,
                servo.period_us
            );
        }
        if !(1..=20).contains(&servo.duty_resolution_bits) {
            anyhow::bail!(
                "servo.duty_resolution_bits must be within 1..=20, got {}",
                servo.duty_resolution_bits
            );
        }
        if servo.sweep_step_degrees == 0 {
            anyhow::bail!("servo.sweep_step_degrees must be greater than zero");
        }

        Ok(())
    }
}
