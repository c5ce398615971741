//! Sistema de alertas – thresholds com histerese e cooldown.
//!
//! Cada métrica monitorada tem um [`MetricAlertState`]. Ao cruzar `warn` o
//! alerta dispara e a métrica fica *armada*, suprimindo repetições. Ela é
//! desarmada de duas formas:
//!
//! - **histerese**: o valor volta para `<= warn` (imediato, cancela o timer);
//! - **cooldown**: o timer de `cooldown_ms` expira, independente do valor.
//!
//! Com isso uma violação contínua volta a disparar uma vez por janela de
//! cooldown.
//!
//! O engine não conhece o relógio do runtime: os timers são agendados por
//! quem implementa [`CooldownTimers`], e a expiração chega de volta por
//! [`AlertEngine::cooldown_expired`] com o handle correspondente.

use crate::config::{AlertThresholds, ThresholdConfig};
use crate::types::{MetricKey, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Severidade de um alerta disparado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Um alerta disparado.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub metric: MetricKey,
    pub value: f64,
    /// Limite ultrapassado (`warn` ou `critical`, conforme a severidade).
    pub threshold: f64,
    pub severity: Severity,
    /// Epoch em ms.
    pub fired_at: i64,
}

impl Alert {
    pub fn title(&self) -> String {
        match self.severity {
            Severity::Warning => format!("⚠ {} acima do limite", self.metric.label()),
            Severity::Critical => format!("🚨 {} em nível crítico", self.metric.label()),
        }
    }

    pub fn body(&self) -> String {
        format!(
            "{} em {:.1}% (limite {:.0}%)",
            self.metric.label(),
            self.value,
            self.threshold
        )
    }
}

/// Retorna a severidade para um valor, ou `None` se não passa de `warn`.
pub fn level_for_value(value: f64, cfg: &ThresholdConfig) -> Option<Severity> {
    if value > cfg.critical {
        Some(Severity::Critical)
    } else if value > cfg.warn {
        Some(Severity::Warning)
    } else {
        None
    }
}

/// Agendador de timers de cooldown, implementado pelo runtime.
pub trait CooldownTimers {
    type Handle;

    /// Agenda a expiração do cooldown de `metric` após `after`.
    fn schedule(&mut self, metric: MetricKey, after: Duration) -> Self::Handle;

    /// Cancela um timer ainda pendente.
    fn cancel(&mut self, handle: Self::Handle);
}

/// Estado de alerta de uma métrica.
#[derive(Debug)]
pub struct MetricAlertState<H> {
    armed: bool,
    last_fired_at: Option<i64>,
    cooldown: Option<H>,
}

impl<H> Default for MetricAlertState<H> {
    fn default() -> Self {
        Self {
            armed: false,
            last_fired_at: None,
            cooldown: None,
        }
    }
}

impl<H> MetricAlertState<H> {
    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn last_fired_at(&self) -> Option<i64> {
        self.last_fired_at
    }

    pub fn cooldown_pending(&self) -> bool {
        self.cooldown.is_some()
    }

    fn disarm<T: CooldownTimers<Handle = H>>(&mut self, timers: &mut T) {
        self.armed = false;
        if let Some(handle) = self.cooldown.take() {
            timers.cancel(handle);
        }
    }
}

/// Engine de alertas. Uma instância por pipeline.
#[derive(Debug)]
pub struct AlertEngine<H> {
    thresholds: AlertThresholds,
    states: BTreeMap<MetricKey, MetricAlertState<H>>,
}

impl<H> AlertEngine<H> {
    pub fn new(thresholds: AlertThresholds) -> Self {
        let states = MetricKey::ALL
            .into_iter()
            .map(|metric| (metric, MetricAlertState::default()))
            .collect();
        Self { thresholds, states }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn state(&self, metric: MetricKey) -> &MetricAlertState<H> {
        &self.states[&metric]
    }

    /// Avalia uma amostra e retorna os alertas disparados, na ordem de
    /// [`MetricKey::ALL`].
    pub fn evaluate<T>(&mut self, sample: &Sample, now_ms: i64, timers: &mut T) -> Vec<Alert>
    where
        T: CooldownTimers<Handle = H>,
    {
        let mut alerts = Vec::new();

        for metric in MetricKey::ALL {
            let cfg = *self.thresholds.get(metric);
            let value = metric.value_in(sample);
            let state = self.states.entry(metric).or_default();

            // Histerese: voltou ao normal enquanto armado
            if value <= cfg.warn {
                if state.armed {
                    state.disarm(timers);
                    debug!(%metric, value, "Métrica normalizada, alerta desarmado");
                }
                continue;
            }

            if state.armed {
                continue;
            }

            let Some(severity) = level_for_value(value, &cfg) else {
                continue;
            };

            state.armed = true;
            state.last_fired_at = Some(now_ms);
            if let Some(stale) = state.cooldown.take() {
                timers.cancel(stale);
            }
            state.cooldown = Some(timers.schedule(metric, cfg.cooldown()));

            info!(%metric, value, %severity, "Alerta disparado");
            alerts.push(Alert {
                metric,
                value,
                threshold: match severity {
                    Severity::Warning => cfg.warn,
                    Severity::Critical => cfg.critical,
                },
                severity,
                fired_at: now_ms,
            });
        }

        alerts
    }

    /// Expiração do cooldown: desarma a métrica independente do valor atual.
    ///
    /// Handles que não são o timer vigente da métrica são ignorados.
    pub fn cooldown_expired(&mut self, metric: MetricKey, handle: &H) -> bool
    where
        H: PartialEq,
    {
        let Some(state) = self.states.get_mut(&metric) else {
            return false;
        };
        if state.cooldown.as_ref() != Some(handle) {
            debug!(%metric, "Timer de cooldown obsoleto ignorado");
            return false;
        }

        state.cooldown = None;
        state.armed = false;
        debug!(%metric, "Cooldown expirado, alerta desarmado");
        true
    }

    /// Cancela todos os timers pendentes e volta ao estado inicial.
    pub fn teardown<T>(&mut self, timers: &mut T)
    where
        T: CooldownTimers<Handle = H>,
    {
        for state in self.states.values_mut() {
            state.disarm(timers);
            state.last_fired_at = None;
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
