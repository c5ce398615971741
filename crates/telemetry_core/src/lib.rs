//! # Telemetry Core
//!
//! Crate compartilhada que define as estruturas de dados, o protocolo JSON,
//! a configuração TOML e a lógica sem I/O do pipeline de telemetria.
//!
//! ## Módulos
//! - [`types`] – Amostra, métricas e estado da conexão
//! - [`protocol`] – Decode/encode JSON das amostras
//! - [`history`] – Histórico rolante de capacidade fixa
//! - [`alerts`] – Engine de alertas com histerese e cooldown
//! - [`connection`] – Máquina de estados da conexão (reconexão com atraso fixo)
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod history;
pub mod alerts;
pub mod connection;
pub mod config;

// Re-exports convenientes
pub use types::{ConnectionState, ConnectionStatus, MetricKey, Sample};
pub use protocol::{decode_sample, encode_sample, DecodeError};
pub use history::HistoryBuffer;
pub use alerts::{Alert, AlertEngine, CooldownTimers, Severity};
pub use connection::{ConnectionManager, Directive, TransportError};
pub use config::{AppConfig, ReceiverConfig, SenderConfig};
