use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ServoConfig;

pub const MAX_ANGLE: u8 = 180;
pub const CENTER_ANGLE: u8 = 90;

/// Output side of a PWM channel.
pub trait PwmChannel: Send + Sync {
    fn set_duty(&self, duty: u32) -> Result<()>;
}

/// Host stand-in for a LEDC channel: keeps the last duty and logs it.
#[derive(Debug, Default)]
pub struct LoggingPwm {
    duty: AtomicU32,
}

impl LoggingPwm {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn duty(&self) -> u32 {
        self.duty.load(Ordering::SeqCst)
    }
}

impl PwmChannel for LoggingPwm {
    fn set_duty(&self, duty: u32) -> Result<()> {
        self.duty.store(duty, Ordering::SeqCst);
        debug!("PWM duty set to {}", duty);
        Ok(())
    }
}

#[async_trait]
pub trait Servo: Send + Sync {
    /// Angles above [`MAX_ANGLE`] are clamped.
    async fn set_angle(&self, angle: u8) -> Result<()>;

    /// Full 0 -> 180 -> 0 sweep.
    async fn sweep(&self) -> Result<()>;

    /// Last commanded angle, `None` before the first command.
    fn angle(&self) -> Option<u8>;

    async fn center(&self) -> Result<()> {
        self.set_angle(CENTER_ANGLE).await
    }
}

/// Positional servo driven by pulse width on a PWM channel.
pub struct PwmServo<C> {
    channel: C,
    config: ServoConfig,
    angle: Mutex<Option<u8>>,
}

impl<C: PwmChannel> PwmServo<C> {
    pub fn new(channel: C, config: ServoConfig) -> Self {
        Self {
            channel,
            config,
            angle: Mutex::new(None),
        }
    }

    #[allow(dead_code)]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Convert angle (0-180) to a duty value at the channel's resolution.
    pub fn angle_to_duty(&self, angle: u8) -> u32 {
        let angle = u64::from(angle.min(MAX_ANGLE));
        let min = u64::from(self.config.min_pulse_us);
        let max = u64::from(self.config.max_pulse_us);
        let pulse_us = min + angle * (max - min) / u64::from(MAX_ANGLE);
        let duty = pulse_us * u64::from(self.config.max_duty()) / u64::from(self.config.period_us);
        duty as u32
    }

    fn write_angle(&self, angle: u8) -> Result<()> {
        let angle = angle.min(MAX_ANGLE);
        let duty = self.angle_to_duty(angle);
        self.channel
            .set_duty(duty)
            .with_context(|| format!("Failed to move servo to {} degrees", angle))?;
        *self
            .angle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(angle);
        Ok(())
    }
}

/// Angles visited by a sweep: up to [`MAX_ANGLE`] in `step` increments, then back to 0.
pub fn sweep_angles(step: u8) -> Vec<u8> {
    let step = usize::from(step.max(1));
    let mut up: Vec<u8> = (0..=MAX_ANGLE).step_by(step).collect();
    if up.last() != Some(&MAX_ANGLE) {
        up.push(MAX_ANGLE);
    }
    let down: Vec<u8> = up.iter().rev().skip(1).copied().collect();
    up.extend(down);
    up
}

#[async_trait]
impl<C: PwmChannel> Servo for PwmServo<C> {
    async fn set_angle(&self, angle: u8) -> Result<()> {
        self.write_angle(angle)?;
        info!("Servo set to {} degrees", angle.min(MAX_ANGLE));
        Ok(())
    }

    async fn sweep(&self) -> Result<()> {
        let delay = Duration::from_millis(self.config.sweep_step_delay_ms);
        for angle in sweep_angles(self.config.sweep_step_degrees) {
            self.write_angle(angle)?;
            tokio::time::sleep(delay).await;
        }
        info!("Servo sweep finished");
        Ok(())
    }

    fn angle(&self) -> Option<u8> {
        *self
            .angle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
