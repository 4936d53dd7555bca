//! cgroup v2 system sampler
//!
//! Reads the unified hierarchy of the cgroup the platform runs in:
//! - cpu.stat usage deltas for CPU percentage
//! - cpu.max for the CPU quota
//! - memory.current / memory.max for memory percentage

use super::{SystemSampler, SystemTelemetry};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::time::Instant;

/// System sampler backed by a cgroup v2 directory
pub struct CgroupSampler {
    cgroup_path: PathBuf,
    proc_path: PathBuf,
    last_cpu: Mutex<Option<CpuReading>>,
}

#[derive(Debug, Clone, Copy)]
struct CpuReading {
    usage_usec: u64,
    at: Instant,
}

impl CgroupSampler {
    pub fn new(cgroup_path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_path: cgroup_path.into(),
            proc_path: PathBuf::from("/proc"),
            last_cpu: Mutex::new(None),
        }
    }

    /// Create a sampler with custom proc path (for testing)
    pub fn with_proc_path(cgroup_path: impl Into<PathBuf>, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_path: cgroup_path.into(),
            proc_path: proc_path.into(),
            last_cpu: Mutex::new(None),
        }
    }

    /// Check if the directory looks like a cgroup v2 group
    pub async fn is_available(&self) -> bool {
        fs::metadata(self.cgroup_path.join("cpu.stat")).await.is_ok()
    }

    /// Parse cpu.stat file contents
    /// Returns (usage_usec, throttled_periods)
    pub fn parse_cpu_stat(content: &str) -> (u64, u64) {
        let mut usage_usec = 0u64;
        let mut throttled_periods = 0u64;

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                match parts[0] {
                    "usage_usec" => usage_usec = parts[1].parse().unwrap_or(0),
                    "nr_throttled" => throttled_periods = parts[1].parse().unwrap_or(0),
                    _ => {}
                }
            }
        }

        (usage_usec, throttled_periods)
    }

    /// Parse cpu.max ("<quota> <period>" or "max <period>") into cores
    pub fn parse_cpu_max(content: &str) -> Option<f64> {
        let mut parts = content.split_whitespace();
        let quota = parts.next()?;
        let period: f64 = parts.next()?.parse().ok()?;
        if quota == "max" || period <= 0.0 {
            return None;
        }
        let quota: f64 = quota.parse().ok()?;
        Some(quota / period)
    }

    /// Parse /proc/meminfo, values in bytes
    pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
        let mut stats = HashMap::new();

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if let Ok(kb) = value.parse::<u64>() {
                    stats.insert(key.trim_end_matches(':').to_string(), kb * 1024);
                }
            }
        }

        stats
    }

    /// CPU percentage between two readings given the available cores
    pub fn cpu_percent(prev_usec: u64, curr_usec: u64, elapsed_secs: f64, cores: f64) -> f64 {
        if elapsed_secs <= 0.0 || cores <= 0.0 {
            return 0.0;
        }
        let used_secs = curr_usec.saturating_sub(prev_usec) as f64 / 1_000_000.0;
        (used_secs / (elapsed_secs * cores) * 100.0).clamp(0.0, 100.0)
    }

    async fn read_cgroup_value(&self, filename: &str) -> Result<u64> {
        let content = self.read_cgroup_file(filename).await?;
        content
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {} value", filename))
    }

    async fn read_cgroup_file(&self, filename: &str) -> Result<String> {
        let file_path = self.cgroup_path.join(filename);
        fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("Failed to read {}", file_path.display()))
    }

    async fn available_cores(&self) -> f64 {
        if let Ok(content) = self.read_cgroup_file("cpu.max").await {
            if let Some(cores) = Self::parse_cpu_max(&content) {
                return cores;
            }
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as f64)
            .unwrap_or(1.0)
    }

    async fn memory_limit(&self) -> Option<u64> {
        if let Ok(content) = self.read_cgroup_file("memory.max").await {
            if let Ok(limit) = content.trim().parse::<u64>() {
                return Some(limit);
            }
        }
        let meminfo = fs::read_to_string(self.proc_path.join("meminfo")).await.ok()?;
        Self::parse_meminfo(&meminfo).get("MemTotal").copied()
    }

    async fn read_cpu(&self, now: Instant) -> Result<CpuReading> {
        let content = self.read_cgroup_file("cpu.stat").await?;
        let (usage_usec, _) = Self::parse_cpu_stat(&content);
        Ok(CpuReading {
            usage_usec,
            at: now,
        })
    }

    fn swap_reading(&self, reading: CpuReading) -> Result<Option<CpuReading>> {
        let mut last = self
            .last_cpu
            .lock()
            .map_err(|_| anyhow::anyhow!("cpu reading lock poisoned"))?;
        Ok(last.replace(reading))
    }

    /// Take the CPU baseline so the first sample already has a usage delta
    pub async fn prime(&self) -> Result<()> {
        self.prime_at(Instant::now()).await
    }

    pub(crate) async fn prime_at(&self, now: Instant) -> Result<()> {
        let reading = self.read_cpu(now).await?;
        self.swap_reading(reading)?;
        Ok(())
    }

    /// CPU percentage since the previous reading, observed at `now`
    ///
    /// Fails without a previous reading; that reading becomes the baseline.
    pub(crate) async fn cpu_usage_at(&self, now: Instant) -> Result<f64> {
        let reading = self.read_cpu(now).await?;
        let cores = self.available_cores().await;

        match self.swap_reading(reading)? {
            Some(prev) => Ok(Self::cpu_percent(
                prev.usage_usec,
                reading.usage_usec,
                now.duration_since(prev.at).as_secs_f64(),
                cores,
            )),
            None => bail!("no CPU baseline yet, usage is available from the next sample"),
        }
    }

    async fn memory_usage(&self) -> Result<f64> {
        let current = self.read_cgroup_value("memory.current").await?;
        Ok(match self.memory_limit().await {
            Some(limit) if limit > 0 => (current as f64 / limit as f64 * 100.0).clamp(0.0, 100.0),
            _ => 0.0,
        })
    }

    pub fn cgroup_path(&self) -> &Path {
        &self.cgroup_path
    }
}

#[async_trait]
impl SystemSampler for CgroupSampler {
    async fn sample(&self) -> Result<SystemTelemetry> {
        let cpu_usage = self.cpu_usage_at(Instant::now()).await?;
        let memory_usage = self.memory_usage().await?;

        // Disk and network are not exposed by the cgroup hierarchy
        Ok(SystemTelemetry {
            cpu_usage,
            memory_usage,
            ..Default::default()
        })
    }
}
