//! Linux sysfs GPIO adapter.
//!
//! Pins are claimed through `{root}/export` and driven through
//! `{root}/gpioN/{direction,value}`. The root defaults to `/sys/class/gpio`
//! and is injectable so the adapter can be exercised against a temporary
//! directory.
//!
//! Claiming a pin that does not appear after export is a startup error.

use crate::{
    HardwareError, Result,
    edge::EdgeSource,
    traits::DigitalOutput,
    types::{DataLine, Level},
};
use std::collections::VecDeque;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default sysfs GPIO root.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Default sampling period of [`SysfsEdges`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(20);

async fn claim_pin(root: &Path, pin: u32, direction: &str) -> Result<PathBuf> {
    let pin_dir = root.join(format!("gpio{pin}"));

    if !pin_dir.exists() {
        debug!(pin, root = %root.display(), "Exporting GPIO pin");
        tokio::fs::write(root.join("export"), pin.to_string())
            .await
            .map_err(|e| HardwareError::pin_unavailable(pin, e.to_string()))?;
    }

    if !pin_dir.exists() {
        return Err(HardwareError::pin_unavailable(
            pin,
            format!("{} did not appear after export", pin_dir.display()),
        ));
    }

    tokio::fs::write(pin_dir.join("direction"), direction)
        .await
        .map_err(|e| HardwareError::pin_unavailable(pin, e.to_string()))?;

    info!(pin, direction, "GPIO pin claimed");
    Ok(pin_dir.join("value"))
}

/// Output pin driven through sysfs.
#[derive(Debug)]
pub struct SysfsOutput {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsOutput {
    /// Export `pin` under `root` and configure it as an output.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinUnavailable` if the pin cannot be claimed.
    pub async fn claim(root: impl AsRef<Path>, pin: u32) -> Result<Self> {
        let value_path = claim_pin(root.as_ref(), pin, "out").await?;
        Ok(Self { pin, value_path })
    }
}

impl DigitalOutput for SysfsOutput {
    async fn set_level(&mut self, level: Level) -> Result<()> {
        tokio::fs::write(&self.value_path, level.as_sysfs())
            .await
            .map_err(|e| HardwareError::write_failed(self.pin, e.to_string()))
    }

    fn pin(&self) -> u32 {
        self.pin
    }
}

/// Wiegand data lines sampled through sysfs.
///
/// A blocking [`EdgeSource`]: both value files stay open and are re-read in
/// place every `poll_interval` (or back to back when it is zero) on the
/// edge thread. A high-to-low transition between two samples is one pulse.
/// Prefer [`CdevEdges`](crate::cdev::CdevEdges) where the kernel offers the
/// GPIO character device.
#[derive(Debug)]
pub struct SysfsEdges {
    name: String,
    d0: SampledLine,
    d1: SampledLine,
    poll_interval: Duration,
    pending: VecDeque<DataLine>,
}

#[derive(Debug)]
struct SampledLine {
    path: PathBuf,
    file: File,
    last: Level,
}

impl SampledLine {
    fn open(path: PathBuf) -> Result<Self> {
        let file = File::open(&path)?;
        let last = read_level_at(&file, &path)?;
        Ok(Self { path, file, last })
    }

    /// Sample once; true on a falling edge.
    fn fell(&mut self) -> Result<bool> {
        let level = read_level_at(&self.file, &self.path)?;
        let fell = self.last.is_high() && !level.is_high();
        self.last = level;
        Ok(fell)
    }
}

fn read_level_at(file: &File, path: &Path) -> Result<Level> {
    let mut buf = [0u8; 4];
    let n = file.read_at(&mut buf, 0)?;
    parse_level(&buf[..n], path)
}

fn parse_level(raw: &[u8], path: &Path) -> Result<Level> {
    match raw.trim_ascii() {
        b"0" => Ok(Level::Low),
        b"1" => Ok(Level::High),
        other => Err(HardwareError::invalid_data(format!(
            "{}: unexpected value {:?}",
            path.display(),
            String::from_utf8_lossy(other)
        ))),
    }
}

impl SysfsEdges {
    /// Claim both data lines as inputs and take the initial levels.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinUnavailable` if either pin cannot be
    /// claimed, `HardwareError::InvalidData` if a value file is unreadable.
    pub async fn claim(
        root: impl AsRef<Path>,
        d0_pin: u32,
        d1_pin: u32,
        poll_interval: Duration,
    ) -> Result<Self> {
        let root = root.as_ref();
        let d0_path = claim_pin(root, d0_pin, "in").await?;
        let d1_path = claim_pin(root, d1_pin, "in").await?;

        Ok(Self {
            name: format!("sysfs wiegand(d0={d0_pin}, d1={d1_pin})"),
            d0: SampledLine::open(d0_path)?,
            d1: SampledLine::open(d1_path)?,
            poll_interval,
            pending: VecDeque::new(),
        })
    }

    fn sample(&mut self) -> Result<()> {
        if self.d0.fell()? {
            self.pending.push_back(DataLine::D0);
        }
        if self.d1.fell()? {
            self.pending.push_back(DataLine::D1);
        }
        Ok(())
    }
}

impl EdgeSource for SysfsEdges {
    fn wait_edge(&mut self, timeout: Duration) -> Result<Option<DataLine>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            self.sample()?;
            if !self.pending.is_empty() {
                continue;
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if self.poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                std::thread::sleep(self.poll_interval);
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
