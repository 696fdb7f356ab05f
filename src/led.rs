use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::info;

/// A single on/off indicator output.
pub trait Led: Send + Sync {
    fn set(&self, on: bool) -> Result<()>;

    fn is_on(&self) -> bool;

    fn toggle(&self) -> Result<()> {
        self.set(!self.is_on())
    }
}

/// Host stand-in for a GPIO pin: keeps the level and logs changes. Starts off.
#[derive(Debug, Default)]
pub struct LoggingLed {
    on: AtomicBool,
}

impl LoggingLed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Led for LoggingLed {
    fn set(&self, on: bool) -> Result<()> {
        self.on.store(on, Ordering::SeqCst);
        info!("LED {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}
