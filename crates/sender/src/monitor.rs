//! Hardware Monitor – coleta via `sysinfo`.
//!
//! Produz as quatro métricas da [`Sample`]:
//! - CPU: uso global (%)
//! - Memória: usada / total (%)
//! - Disco: espaço usado somado de todos os discos (%)
//! - Rede: throughput total (KiB/s, download + upload)

use std::time::Instant;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};
use telemetry_core::Sample;

/// Monitor de hardware principal.
pub struct HardwareMonitor {
    sys: System,
    disks: Disks,
    networks: Networks,
    /// Bytes de rede do último ciclo (total, timestamp)
    last_net: Option<(u64, Instant)>,
}

impl HardwareMonitor {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_net: None,
        }
    }

    /// Atualiza os sensores e retorna uma amostra.
    pub fn collect(&mut self) -> Sample {
        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.networks.refresh(true);
        self.disks.refresh(true);

        Sample {
            cpu: self.sys.global_cpu_usage() as f64,
            memory: self.memory_percent(),
            disk: self.disk_percent(),
            network: self.network_kibps(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    fn memory_percent(&self) -> f64 {
        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        if total > 0.0 { used / total * 100.0 } else { 0.0 }
    }

    fn disk_percent(&self) -> f64 {
        let (total, available) = self
            .disks
            .iter()
            .fold((0u64, 0u64), |(t, a), disk| {
                (t + disk.total_space(), a + disk.available_space())
            });
        if total > 0 {
            total.saturating_sub(available) as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }

    fn network_kibps(&mut self) -> f64 {
        let total: u64 = self
            .networks
            .iter()
            .map(|(_name, data)| data.total_received() + data.total_transmitted())
            .sum();

        let now = Instant::now();
        let rate = match self.last_net {
            Some((last_total, last_time)) => {
                let dt = now.duration_since(last_time).as_secs_f64();
                if dt > 0.0 {
                    total.saturating_sub(last_total) as f64 / 1024.0 / dt
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.last_net = Some((total, now));
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_sample_is_plausible() {
        let mut hw = HardwareMonitor::new();
        let _ = hw.collect();
        let sample = hw.collect();

        assert!((0.0..=100.0).contains(&sample.memory));
        assert!((0.0..=100.0).contains(&sample.disk));
        assert!(sample.network >= 0.0);
        assert!(sample.timestamp > 0);
    }

    #[test]
    fn first_network_reading_is_zero() {
        let mut hw = HardwareMonitor::new();
        assert_eq!(hw.network_kibps(), 0.0);
    }
}
