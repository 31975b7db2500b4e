use crate::error::Error;
use crate::poll::MAX_WORKERS;

/// Configuration for the DCB core.
#[derive(Clone)]
pub struct Config {
    /// Largest single buffer the read path allocates. A readable event with
    /// more pending data than this produces multiple chain segments.
    pub max_buffer_size: usize,
    /// Number of worker threads the poll subsystem may run. Bounded by
    /// [`MAX_WORKERS`] because the zombie reaper tracks workers in a
    /// single 64-bit mask.
    pub max_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_buffer_size: 4096,
            max_workers: MAX_WORKERS,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "max_buffer_size must be > 0".into(),
            ));
        }
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(Error::InvalidConfig(format!(
                "max_workers must be in 1..={MAX_WORKERS}"
            )));
        }
        Ok(())
    }
}
