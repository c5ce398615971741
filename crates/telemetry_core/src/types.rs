//! Definição de tipos/structs para telemetria.
//!
//! A [`Sample`] é a unidade que trafega pelo pipeline: chega como JSON pelo
//! WebSocket, é decodificada uma única vez e depois só é lida.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Amostra
// ──────────────────────────────────────────────

/// Uma leitura de telemetria decodificada. Imutável após criada.
///
/// Nenhuma validação de faixa é feita: `cpu = 140.0` é uma amostra válida.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Uso total da CPU (0–100%)
    pub cpu: f64,
    /// Uso de memória (0–100%)
    pub memory: f64,
    /// Uso de disco (0–100%)
    pub disk: f64,
    /// Throughput de rede (KiB/s, ≥ 0)
    pub network: f64,
    /// Momento da leitura (epoch em ms)
    pub timestamp: i64,
}

// ──────────────────────────────────────────────
// Métricas monitoradas por alertas
// ──────────────────────────────────────────────

/// Métricas que possuem thresholds de alerta.
///
/// `network` não entra aqui: não tem limite de perigo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Cpu,
    Memory,
    Disk,
}

impl MetricKey {
    /// Ordem fixa de avaliação.
    pub const ALL: [MetricKey; 3] = [MetricKey::Cpu, MetricKey::Memory, MetricKey::Disk];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::Cpu => "cpu",
            MetricKey::Memory => "memory",
            MetricKey::Disk => "disk",
        }
    }

    /// Rótulo curto para títulos de notificação.
    pub fn label(self) -> &'static str {
        match self {
            MetricKey::Cpu => "CPU",
            MetricKey::Memory => "Memória",
            MetricKey::Disk => "Disco",
        }
    }

    /// Extrai o valor desta métrica de uma amostra.
    pub fn value_in(self, sample: &Sample) -> f64 {
        match self {
            MetricKey::Cpu => sample.cpu,
            MetricKey::Memory => sample.memory,
            MetricKey::Disk => sample.disk,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Fase do link de streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "desconectado",
            ConnectionStatus::Connecting => "conectando",
            ConnectionStatus::Connected => "conectado",
        };
        f.write_str(s)
    }
}

/// Estado observável da conexão: fase + último erro de transporte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
