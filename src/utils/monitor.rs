use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub pid: u32,
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed_time: Duration,
}

/// 以 sysinfo 觀察子程序 (simulton) 並傳送 POSIX 信號
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
    start_time: Instant,
    peak_memory: u64,
}

impl ProcessMonitor {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
            start_time: Instant::now(),
            peak_memory: 0,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_u32()
    }

    fn refresh(&mut self) {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
    }

    pub fn get_stats(&mut self) -> Option<ProcessStats> {
        self.refresh();
        let process = self.system.process(self.pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let cpu_usage = process.cpu_usage();

        // 更新峰值記憶體
        if memory_mb > self.peak_memory {
            self.peak_memory = memory_mb;
        }

        Some(ProcessStats {
            pid: self.pid.as_u32(),
            cpu_usage,
            memory_usage_mb: memory_mb,
            peak_memory_mb: self.peak_memory,
            elapsed_time: self.start_time.elapsed(),
        })
    }

    pub fn log_stats(&mut self, phase: &str) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                "📊 {} - pid {} CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Up: {:?}",
                phase,
                stats.pid,
                stats.cpu_usage,
                stats.memory_usage_mb,
                stats.peak_memory_mb,
                stats.elapsed_time
            );
        }
    }

    /// Sends `signal` to the watched process.
    ///
    /// Returns `false` when the process is gone or the platform does not
    /// support the signal.
    pub fn send_signal(&mut self, signal: Signal) -> bool {
        self.refresh();
        match self.system.process(self.pid) {
            Some(process) => process.kill_with(signal).unwrap_or(false),
            None => {
                tracing::debug!("Process {} not found, cannot send {:?}", self.pid, signal);
                false
            }
        }
    }
}
