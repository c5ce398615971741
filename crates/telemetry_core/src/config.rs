//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com as seções `[sender]` e `[receiver]`. Todos os
//! structs usam `#[serde(default)]`, então arquivos parciais funcionam.

use crate::types::MetricKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Atraso fixo entre reconexões (ms).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Cooldown padrão dos alertas (ms).
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Erros ao persistir configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuração do Sender (fonte de métricas).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// IP local para bind do servidor WebSocket
    pub bind_ip: String,
    /// Porta TCP
    pub port: u16,
    /// Intervalo de coleta/envio em segundos
    pub interval_secs: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".into(),
            port: 8080,
            interval_secs: 1.0,
        }
    }
}

/// Limites de uma métrica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub warn: f64,
    pub critical: f64,
    pub cooldown_ms: u64,
}

impl ThresholdConfig {
    pub const fn new(warn: f64, critical: f64, cooldown_ms: u64) -> Self {
        Self {
            warn,
            critical,
            cooldown_ms,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Tabela de thresholds por métrica.
///
/// Campos ausentes numa tabela `[receiver.alerts.<métrica>]` herdam o padrão
/// daquela métrica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartialAlertThresholds")]
pub struct AlertThresholds {
    pub cpu: ThresholdConfig,
    pub memory: ThresholdConfig,
    pub disk: ThresholdConfig,
}

/// Forma lida do TOML, antes de completar com os padrões.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialAlertThresholds {
    cpu: PartialThreshold,
    memory: PartialThreshold,
    disk: PartialThreshold,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialThreshold {
    warn: Option<f64>,
    critical: Option<f64>,
    cooldown_ms: Option<u64>,
}

impl PartialThreshold {
    fn or(self, base: ThresholdConfig) -> ThresholdConfig {
        ThresholdConfig {
            warn: self.warn.unwrap_or(base.warn),
            critical: self.critical.unwrap_or(base.critical),
            cooldown_ms: self.cooldown_ms.unwrap_or(base.cooldown_ms),
        }
    }
}

impl From<PartialAlertThresholds> for AlertThresholds {
    fn from(partial: PartialAlertThresholds) -> Self {
        let base = AlertThresholds::default();
        Self {
            cpu: partial.cpu.or(base.cpu),
            memory: partial.memory.or(base.memory),
            disk: partial.disk.or(base.disk),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu: ThresholdConfig::new(70.0, 85.0, DEFAULT_COOLDOWN_MS),
            memory: ThresholdConfig::new(80.0, 90.0, DEFAULT_COOLDOWN_MS),
            disk: ThresholdConfig::new(85.0, 95.0, DEFAULT_COOLDOWN_MS),
        }
    }
}

impl AlertThresholds {
    pub fn get(&self, metric: MetricKey) -> &ThresholdConfig {
        match metric {
            MetricKey::Cpu => &self.cpu,
            MetricKey::Memory => &self.memory,
            MetricKey::Disk => &self.disk,
        }
    }
}

/// Configuração de notificações.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Backend: "log" ou "ntfy"
    pub backend: String,
    pub ntfy_server: String,
    pub ntfy_topic: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "log".into(),
            ntfy_server: "https://ntfy.sh".into(),
            ntfy_topic: String::new(),
        }
    }
}

/// Configuração do Receiver (pipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// URL do WebSocket da fonte de métricas
    pub url: String,
    /// Atraso fixo entre reconexões (ms)
    pub reconnect_delay_ms: u64,
    /// Quantidade de amostras mantidas no histórico
    pub history_capacity: usize,
    /// Thresholds de alerta
    pub alerts: AlertThresholds,
    /// Notificações
    pub notifications: NotificationConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            history_capacity: crate::history::HISTORY_SIZE,
            alerts: AlertThresholds::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Configuração raiz do aplicativo (unifica sender e receiver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sender: SenderConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.sender.port == 0 {
            errors.push("Porta do sender não pode ser 0".into());
        }
        if self.sender.interval_secs < 0.1 || self.sender.interval_secs > 60.0 {
            errors.push(format!(
                "Intervalo do sender inválido: {} (0.1–60.0)",
                self.sender.interval_secs
            ));
        }

        let recv = &self.receiver;
        if !(recv.url.starts_with("ws://") || recv.url.starts_with("wss://")) {
            errors.push(format!("URL do receiver deve usar ws:// ou wss://: {}", recv.url));
        }
        if recv.reconnect_delay_ms == 0 {
            errors.push("Atraso de reconexão não pode ser 0".into());
        }
        if recv.history_capacity == 0 {
            errors.push("Capacidade do histórico não pode ser 0".into());
        }
        for metric in MetricKey::ALL {
            let th = recv.alerts.get(metric);
            if th.warn > th.critical {
                errors.push(format!(
                    "Threshold de {metric}: warn ({}) maior que critical ({})",
                    th.warn, th.critical
                ));
            }
            if th.cooldown_ms == 0 {
                errors.push(format!("Cooldown de {metric} não pode ser 0"));
            }
        }
        if !matches!(recv.notifications.backend.as_str(), "log" | "ntfy") {
            errors.push(format!(
                "Backend de notificação desconhecido: {} (log, ntfy)",
                recv.notifications.backend
            ));
        }

        errors
    }
}
