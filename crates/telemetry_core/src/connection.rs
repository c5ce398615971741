//! Máquina de estados da conexão com a fonte de métricas.
//!
//! ```text
//!  Disconnected ──start──▶ Connecting ──on_open──▶ Connected
//!       ▲                      │                      │
//!       └──────on_close────────┴──────on_close────────┘
//!       │
//!       └── reconexão após atraso fixo ──▶ Connecting
//! ```
//!
//! Não faz I/O: cada transição devolve [`Directive`]s que o runtime executa
//! (abrir/fechar o transporte, agendar/cancelar o timer de reconexão). Isso
//! garante no máximo um transporte vivo e um timer de reconexão pendente.

use crate::protocol::decode_sample;
use crate::types::{ConnectionState, ConnectionStatus, Sample};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Erros de transporte. Só aparecem para fora via [`ConnectionState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao conectar em {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Erro no WebSocket: {0}")]
    Stream(String),
}

/// Ação que o runtime deve executar após uma transição.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Abrir um novo transporte para a URL.
    Open(String),
    /// Fechar o transporte aberto.
    Close,
    /// Agendar uma tentativa de reconexão.
    ScheduleReconnect(Duration),
    /// Cancelar o timer de reconexão pendente.
    CancelReconnect,
}

/// Gerenciador de conexão.
#[derive(Debug)]
pub struct ConnectionManager {
    url: Option<String>,
    state: ConnectionState,
    reconnect_delay: Duration,
    transport_live: bool,
    reconnect_pending: bool,
    stopped: bool,
}

impl ConnectionManager {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            url: None,
            state: ConnectionState::default(),
            reconnect_delay,
            transport_live: false,
            reconnect_pending: false,
            stopped: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Inicia a conexão. Não faz nada se já estiver conectando/conectado.
    pub fn start(&mut self, url: &str) -> Vec<Directive> {
        if self.state.status != ConnectionStatus::Disconnected {
            debug!("start() ignorado: conexão já {}", self.state.status);
            return Vec::new();
        }

        let mut directives = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            directives.push(Directive::CancelReconnect);
        }

        self.stopped = false;
        self.url = Some(url.to_owned());
        directives.push(self.open());
        directives
    }

    /// Transporte aberto com sucesso.
    pub fn on_open(&mut self) {
        if self.state.status != ConnectionStatus::Connecting {
            return;
        }
        self.state.status = ConnectionStatus::Connected;
        self.state.last_error = None;
        info!("✓ Conectado a {}", self.url.as_deref().unwrap_or("?"));
    }

    /// Payload recebido. Falhas de decodificação são logadas e descartadas.
    pub fn on_message(&self, raw: &[u8]) -> Option<Sample> {
        match decode_sample(raw) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("Payload descartado ({} bytes): {e}", raw.len());
                None
            }
        }
    }

    /// Erro de transporte. Só registra: o fechamento chega em [`Self::on_close`].
    pub fn on_error(&mut self, err: &TransportError) {
        warn!("✗ {err}");
        self.state.last_error = Some(err.to_string());
    }

    /// Transporte fechado (por erro ou pelo servidor).
    pub fn on_close(&mut self) -> Vec<Directive> {
        self.transport_live = false;
        self.state.status = ConnectionStatus::Disconnected;

        if self.stopped || self.reconnect_pending {
            return Vec::new();
        }

        info!(
            "Conexão encerrada. Reconectando em {}ms...",
            self.reconnect_delay.as_millis()
        );
        self.reconnect_pending = true;
        vec![Directive::ScheduleReconnect(self.reconnect_delay)]
    }

    /// Timer de reconexão expirou.
    pub fn on_reconnect_timer(&mut self) -> Vec<Directive> {
        if !self.reconnect_pending || self.stopped {
            return Vec::new();
        }
        self.reconnect_pending = false;
        info!("Tentando reconectar...");
        vec![self.open()]
    }

    /// Encerra: cancela reconexão pendente e fecha o transporte.
    pub fn stop(&mut self) -> Vec<Directive> {
        self.stopped = true;

        let mut directives = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            directives.push(Directive::CancelReconnect);
        }
        if self.transport_live {
            self.transport_live = false;
            directives.push(Directive::Close);
        }
        self.state.status = ConnectionStatus::Disconnected;
        directives
    }

    fn open(&mut self) -> Directive {
        self.state.status = ConnectionStatus::Connecting;
        self.transport_live = true;
        Directive::Open(self.url.clone().unwrap_or_default())
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_RECONNECT_DELAY_MS))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "ws://127.0.0.1:8080";
    const DELAY: Duration = Duration::from_millis(3000);

    #[test]
    fn open_messages_close_reconnect_sequence() {
        let mut conn = ConnectionManager::default();
        let mut seen = vec![conn.state().status];

        assert_eq!(conn.start(URL), vec![Directive::Open(URL.into())]);
        seen.push(conn.state().status);

        conn.on_open();
        seen.push(conn.state().status);

        let raw = br#"{"cpu":1,"memory":2,"disk":3,"network":4,"timestamp":5}"#;
        for _ in 0..3 {
            assert!(conn.on_message(raw).is_some());
            assert!(conn.state().is_connected());
        }

        assert_eq!(conn.on_close(), vec![Directive::ScheduleReconnect(DELAY)]);
        seen.push(conn.state().status);

        assert_eq!(conn.on_reconnect_timer(), vec![Directive::Open(URL.into())]);
        seen.push(conn.state().status);

        use ConnectionStatus::*;
        assert_eq!(seen, vec![Disconnected, Connecting, Connected, Disconnected, Connecting]);
    }

    #[test]
    fn start_is_idempotent_while_active() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        assert!(conn.start(URL).is_empty());
        conn.on_open();
        assert!(conn.start("ws://other").is_empty());
        assert_eq!(conn.url(), Some(URL));
    }

    #[test]
    fn error_is_recorded_without_closing() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_open();
        conn.on_error(&TransportError::Stream("reset by peer".into()));

        assert!(conn.state().is_connected());
        assert_eq!(
            conn.state().last_error.as_deref(),
            Some("Erro no WebSocket: reset by peer")
        );

        conn.on_close();
        conn.on_reconnect_timer();
        conn.on_open();
        assert!(conn.state().last_error.is_none());
    }

    #[test]
    fn failed_connect_schedules_reconnect_forever() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        for _ in 0..5 {
            conn.on_error(&TransportError::Connect {
                url: URL.into(),
                reason: "connection refused".into(),
            });
            assert_eq!(conn.on_close(), vec![Directive::ScheduleReconnect(DELAY)]);
            assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
            assert_eq!(conn.on_reconnect_timer(), vec![Directive::Open(URL.into())]);
        }
    }

    #[test]
    fn duplicate_close_schedules_single_reconnect() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_open();
        assert_eq!(conn.on_close().len(), 1);
        assert!(conn.on_close().is_empty());
    }

    #[test]
    fn stop_cancels_pending_reconnect() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_open();
        conn.on_close();
        assert!(conn.reconnect_pending());

        assert_eq!(conn.stop(), vec![Directive::CancelReconnect]);
        assert!(conn.on_reconnect_timer().is_empty());
        assert!(conn.on_close().is_empty());
    }

    #[test]
    fn stop_closes_live_transport() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_open();
        assert_eq!(conn.stop(), vec![Directive::Close]);
        assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
        assert!(conn.stop().is_empty());
    }

    #[test]
    fn start_while_waiting_cancels_timer_and_opens() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_close();
        assert_eq!(
            conn.start(URL),
            vec![Directive::CancelReconnect, Directive::Open(URL.into())]
        );
        assert!(conn.on_reconnect_timer().is_empty());
    }

    #[test]
    fn malformed_message_does_not_touch_state() {
        let mut conn = ConnectionManager::default();
        conn.start(URL);
        conn.on_open();
        let before = conn.state().clone();
        assert!(conn.on_message(br#"{"cpu":40,"memory":"bad"}"#).is_none());
        assert_eq!(conn.state(), &before);
    }
}
