//! Pipeline de telemetria – loop de eventos single-thread.
//!
//! Um único `select!` serializa tudo que acontece: eventos do transporte,
//! o timer de reconexão e os timers de cooldown dos alertas. Cada mensagem é
//! decodificada, entra no histórico e é avaliada antes do próximo evento.
//!
//! Todos os timers vivem numa [`DelayQueue`]; a chave de cada entrada é o
//! handle guardado pelo dono (gerenciador de conexão ou engine de alertas), e
//! o teardown remove todas antes de descartar o estado.

use crate::notify::{Dispatcher, NotificationGate};
use crate::transport::{Connector, EventStream, TransportEvent};
use futures::StreamExt;
use futures::future::BoxFuture;
use std::time::Duration;
use telemetry_core::alerts::CooldownTimers;
use telemetry_core::{
    AlertEngine, ConnectionManager, ConnectionState, Directive, HistoryBuffer, MetricKey,
    ReceiverConfig, Sample, TransportError,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::{Expired, Key};
use tracing::{debug, info};

/// O que um timer da fila representa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Reconnect,
    Cooldown(MetricKey),
}

/// Fila única de timers do pipeline.
struct Timers {
    queue: DelayQueue<TimerKind>,
    reconnect: Option<Key>,
}

impl Timers {
    fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            reconnect: None,
        }
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect();
        self.reconnect = Some(self.queue.insert(TimerKind::Reconnect, delay));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(key) = self.reconnect.take() {
            self.queue.try_remove(&key);
        }
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl CooldownTimers for Timers {
    type Handle = Key;

    fn schedule(&mut self, metric: MetricKey, after: Duration) -> Key {
        self.queue.insert(TimerKind::Cooldown(metric), after)
    }

    fn cancel(&mut self, handle: Key) {
        self.queue.try_remove(&handle);
    }
}

/// Estado do link com a fonte.
enum Link {
    Idle,
    Connecting(BoxFuture<'static, Result<EventStream, TransportError>>),
    Open(EventStream),
}

enum LinkEvent {
    Opened(EventStream),
    Failed(TransportError),
    Transport(TransportEvent),
}

/// Espera o próximo evento do link. `Idle` nunca produz eventos.
async fn next_link_event(link: &mut Link) -> LinkEvent {
    match link {
        Link::Idle => std::future::pending().await,
        Link::Connecting(connecting) => match connecting.await {
            Ok(stream) => LinkEvent::Opened(stream),
            Err(e) => LinkEvent::Failed(e),
        },
        Link::Open(stream) => {
            LinkEvent::Transport(stream.next().await.unwrap_or(TransportEvent::Closed))
        }
    }
}

/// Pipeline completo: conexão → decoder → {histórico, alertas} → notificações.
pub struct Pipeline<C, D> {
    url: String,
    connector: C,
    notifier: NotificationGate<D>,
    connection: ConnectionManager,
    history: HistoryBuffer,
    engine: AlertEngine<Key>,
    timers: Timers,
    link: Link,
    state_tx: watch::Sender<ConnectionState>,
    history_tx: watch::Sender<Vec<Sample>>,
}

impl<C: Connector, D: Dispatcher> Pipeline<C, D> {
    /// Monta o pipeline. A permissão de notificação é pedida aqui, uma vez.
    pub fn new(connector: C, dispatcher: D, config: &ReceiverConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (history_tx, _) = watch::channel(Vec::new());

        Self {
            url: config.url.clone(),
            connector,
            notifier: NotificationGate::acquire(dispatcher),
            connection: ConnectionManager::new(config.reconnect_delay()),
            history: HistoryBuffer::new(config.history_capacity),
            engine: AlertEngine::new(config.alerts.clone()),
            timers: Timers::new(),
            link: Link::Idle,
            state_tx,
            history_tx,
        }
    }

    /// Acompanha o estado da conexão.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Acompanha o histórico (snapshot a cada amostra).
    pub fn subscribe_history(&self) -> watch::Receiver<Vec<Sample>> {
        self.history_tx.subscribe()
    }

    /// Roda até `shutdown` ser cancelado, então faz o teardown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let directives = self.connection.start(&self.url);
        self.apply(directives);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(expired) = self.timers.queue.next() => self.on_timer(expired),

                event = next_link_event(&mut self.link) => self.on_link_event(event),
            }
        }

        self.teardown();
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened(stream) => {
                self.link = Link::Open(stream);
                self.connection.on_open();
            }
            LinkEvent::Failed(err) => {
                self.link = Link::Idle;
                self.connection.on_error(&err);
                let directives = self.connection.on_close();
                self.apply(directives);
            }
            LinkEvent::Transport(TransportEvent::Message(raw)) => {
                if let Some(sample) = self.connection.on_message(&raw) {
                    self.on_sample(sample);
                }
            }
            LinkEvent::Transport(TransportEvent::Error(err)) => {
                self.connection.on_error(&err);
            }
            LinkEvent::Transport(TransportEvent::Closed) => {
                self.link = Link::Idle;
                let directives = self.connection.on_close();
                self.apply(directives);
            }
        }
        self.publish_state();
    }

    fn on_sample(&mut self, sample: Sample) {
        debug!(
            "← CPU {:.1}% | MEM {:.1}% | DISK {:.1}% | NET {:.1}",
            sample.cpu, sample.memory, sample.disk, sample.network
        );

        self.history.append(sample);
        self.history_tx.send_replace(self.history.snapshot());

        let now_ms = chrono::Utc::now().timestamp_millis();
        let alerts = self.engine.evaluate(&sample, now_ms, &mut self.timers);
        for alert in &alerts {
            if let Err(e) = self.notifier.deliver(alert) {
                debug!("Alerta de {} não exibido: {e}", alert.metric);
            }
        }
    }

    fn on_timer(&mut self, expired: Expired<TimerKind>) {
        let key = expired.key();
        match expired.into_inner() {
            TimerKind::Reconnect => {
                self.timers.reconnect = None;
                let directives = self.connection.on_reconnect_timer();
                self.apply(directives);
            }
            TimerKind::Cooldown(metric) => {
                self.engine.cooldown_expired(metric, &key);
            }
        }
    }

    fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Open(url) => {
                    info!("Conectando a {url}...");
                    self.link = Link::Connecting(self.connector.connect(url));
                }
                // Descartar o stream faz o transporte enviar o frame Close
                Directive::Close => self.link = Link::Idle,
                Directive::ScheduleReconnect(delay) => self.timers.schedule_reconnect(delay),
                Directive::CancelReconnect => self.timers.cancel_reconnect(),
            }
        }
        self.publish_state();
    }

    fn publish_state(&self) {
        let state = self.connection.state();
        self.state_tx.send_if_modified(|current| {
            if *current == *state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }

    /// Cancela reconexão, fecha o transporte e todos os cooldowns.
    fn teardown(&mut self) {
        let directives = self.connection.stop();
        self.apply(directives);
        self.link = Link::Idle;
        self.engine.teardown(&mut self.timers);
        self.history.clear();
        self.history_tx.send_replace(Vec::new());
        debug!("Teardown concluído ({} timers pendentes)", self.timers.pending());
        info!("Pipeline encerrado");
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
