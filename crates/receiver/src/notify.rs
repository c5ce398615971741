//! Entrega de alertas ao operador.
//!
//! A permissão é obtida uma única vez, na inicialização. Sem permissão os
//! alertas são descartados em silêncio: nada fica em fila nem é reenviado.

use telemetry_core::config::NotificationConfig;
use telemetry_core::{Alert, Severity};
use tracing::{debug, error, info, warn};

/// Resultado da solicitação de permissão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// O dispatcher não tem permissão para entregar notificações.
#[derive(Debug, thiserror::Error)]
#[error("Permissão de notificação indisponível")]
pub struct PermissionUnavailable;

/// Destino das notificações.
pub trait Dispatcher {
    /// Chamado uma vez, antes de qualquer `dispatch`.
    fn request_permission(&mut self) -> Permission;

    fn dispatch(&mut self, title: &str, body: &str, severity: Severity);
}

/// Envolve um [`Dispatcher`] com a permissão obtida na inicialização.
pub struct NotificationGate<D> {
    inner: D,
    permission: Permission,
}

impl<D: Dispatcher> NotificationGate<D> {
    pub fn acquire(mut inner: D) -> Self {
        let permission = inner.request_permission();
        match permission {
            Permission::Granted => info!("Notificações habilitadas"),
            Permission::Denied => warn!("Notificações indisponíveis: alertas não serão exibidos"),
        }
        Self { inner, permission }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn deliver(&mut self, alert: &Alert) -> Result<(), PermissionUnavailable> {
        if self.permission != Permission::Granted {
            return Err(PermissionUnavailable);
        }
        self.inner
            .dispatch(&alert.title(), &alert.body(), alert.severity);
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Backends
// ──────────────────────────────────────────────

/// Escreve os alertas no log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn request_permission(&mut self) -> Permission {
        Permission::Granted
    }

    fn dispatch(&mut self, title: &str, body: &str, severity: Severity) {
        match severity {
            Severity::Warning => warn!("{title} – {body}"),
            Severity::Critical => error!("{title} – {body}"),
        }
    }
}

/// Publica os alertas num tópico ntfy (`POST {server}/{topic}`).
#[derive(Debug, Clone)]
pub struct NtfyDispatcher {
    client: reqwest::Client,
    server: String,
    topic: String,
}

impl NtfyDispatcher {
    pub fn new(server: &str, topic: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            server: server.trim_end_matches('/').to_owned(),
            topic: topic.trim().to_owned(),
        }
    }

    /// Título, prioridade e tags vão na query: cabeçalhos HTTP não aceitam UTF-8.
    fn build_request(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> reqwest::Result<reqwest::Request> {
        let (priority, tags) = match severity {
            Severity::Warning => ("high", "warning"),
            Severity::Critical => ("urgent", "rotating_light"),
        };
        self.client
            .post(format!("{}/{}", self.server, self.topic))
            .query(&[("title", title), ("priority", priority), ("tags", tags)])
            .body(body.to_owned())
            .build()
    }
}

impl Dispatcher for NtfyDispatcher {
    fn request_permission(&mut self) -> Permission {
        if self.topic.is_empty() {
            warn!("ntfy sem tópico configurado");
            Permission::Denied
        } else {
            Permission::Granted
        }
    }

    fn dispatch(&mut self, title: &str, body: &str, severity: Severity) {
        let request = match self.build_request(title, body, severity) {
            Ok(request) => request,
            Err(e) => {
                warn!("Falha ao montar notificação ntfy: {e}");
                return;
            }
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            match client.execute(request).await {
                Ok(resp) if resp.status().is_success() => debug!("Notificação ntfy entregue"),
                Ok(resp) => warn!("ntfy respondeu {}", resp.status()),
                Err(e) => warn!("Erro ao enviar notificação ntfy: {e}"),
            }
        });
    }
}

/// Backend escolhido pela configuração.
#[derive(Debug, Clone)]
pub enum Notifier {
    Disabled,
    Log(LogDispatcher),
    Ntfy(NtfyDispatcher),
}

impl Notifier {
    pub fn from_config(cfg: &NotificationConfig) -> Self {
        if !cfg.enabled {
            return Notifier::Disabled;
        }
        match cfg.backend.as_str() {
            "ntfy" => Notifier::Ntfy(NtfyDispatcher::new(&cfg.ntfy_server, &cfg.ntfy_topic)),
            _ => Notifier::Log(LogDispatcher),
        }
    }
}

impl Dispatcher for Notifier {
    fn request_permission(&mut self) -> Permission {
        match self {
            Notifier::Disabled => Permission::Denied,
            Notifier::Log(d) => d.request_permission(),
            Notifier::Ntfy(d) => d.request_permission(),
        }
    }

    fn dispatch(&mut self, title: &str, body: &str, severity: Severity) {
        match self {
            Notifier::Disabled => {}
            Notifier::Log(d) => d.dispatch(title, body, severity),
            Notifier::Ntfy(d) => d.dispatch(title, body, severity),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

/// Dispatcher que só grava o que recebeu.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct RecordingDispatcher {
    pub permission: Permission,
    pub sent: std::sync::Arc<std::sync::Mutex<Vec<(String, String, Severity)>>>,
}

#[cfg(test)]
impl RecordingDispatcher {
    pub fn granted() -> Self {
        Self {
            permission: Permission::Granted,
            sent: Default::default(),
        }
    }

    pub fn severities(&self) -> Vec<Severity> {
        self.sent.lock().unwrap().iter().map(|(_, _, s)| *s).collect()
    }
}

#[cfg(test)]
impl Dispatcher for RecordingDispatcher {
    fn request_permission(&mut self) -> Permission {
        self.permission
    }

    fn dispatch(&mut self, title: &str, body: &str, severity: Severity) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_owned(), body.to_owned(), severity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::MetricKey;

    fn alert(severity: Severity) -> Alert {
        Alert {
            metric: MetricKey::Cpu,
            value: 91.0,
            threshold: 85.0,
            severity,
            fired_at: 0,
        }
    }

    #[test]
    fn granted_gate_forwards_alert() {
        let recorder = RecordingDispatcher::granted();
        let mut gate = NotificationGate::acquire(recorder.clone());
        gate.deliver(&alert(Severity::Critical)).unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "CPU em 91.0% (limite 85%)");
        assert_eq!(sent[0].2, Severity::Critical);
    }

    #[test]
    fn denied_gate_drops_alert() {
        let recorder = RecordingDispatcher {
            permission: Permission::Denied,
            ..RecordingDispatcher::granted()
        };
        let mut gate = NotificationGate::acquire(recorder.clone());
        assert!(gate.deliver(&alert(Severity::Warning)).is_err());
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn disabled_config_denies_permission() {
        let cfg = NotificationConfig {
            enabled: false,
            ..Default::default()
        };
        let gate = NotificationGate::acquire(Notifier::from_config(&cfg));
        assert_eq!(gate.permission(), Permission::Denied);
    }

    #[test]
    fn ntfy_requires_topic() {
        let cfg = NotificationConfig {
            backend: "ntfy".into(),
            ..Default::default()
        };
        let gate = NotificationGate::acquire(Notifier::from_config(&cfg));
        assert_eq!(gate.permission(), Permission::Denied);

        let mut ntfy = NtfyDispatcher::new("https://ntfy.sh", "ops-alerts");
        assert_eq!(ntfy.request_permission(), Permission::Granted);
    }

    #[test]
    fn ntfy_request_carries_title_and_priority() {
        let ntfy = NtfyDispatcher::new("https://ntfy.example.com/", "ops");
        let request = ntfy
            .build_request("🚨 CPU em nível crítico", "CPU em 91.0%", Severity::Critical)
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        let url = request.url();
        assert_eq!(url.path(), "/ops");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("title".into(), "🚨 CPU em nível crítico".into())));
        assert!(query.contains(&("priority".into(), "urgent".into())));
    }

    #[test]
    fn log_backend_is_default() {
        let notifier = Notifier::from_config(&NotificationConfig::default());
        assert!(matches!(notifier, Notifier::Log(_)));
    }
}
