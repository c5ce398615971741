//! # Telemetria Receiver
//!
//! Mantém uma conexão WebSocket resiliente com a fonte de métricas,
//! guarda o histórico recente e dispara alertas quando CPU, memória ou
//! disco passam dos thresholds configurados.
//!
//! ## Uso
//! ```bash
//! telemetry_receiver                              # config.toml ao lado do executável
//! telemetry_receiver --url ws://10.0.0.5:8080     # sobrescreve receiver.url
//! telemetry_receiver --config /etc/telemetria.toml
//! ```

mod notify;
mod pipeline;
mod transport;

use anyhow::bail;
use clap::Parser;
use notify::Notifier;
use pipeline::Pipeline;
use std::path::PathBuf;
use telemetry_core::config::AppConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use transport::WebSocketConnector;

#[derive(Debug, Parser)]
#[command(name = "telemetry_receiver", version, about = "Telemetria Receiver")]
struct Cli {
    /// Caminho do config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URL do WebSocket da fonte (sobrescreve a config)
    #[arg(long)]
    url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // ── Config ──
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(url) = cli.url {
        config.receiver.url = url;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("Configuração inválida ({} erros)", errors.len());
    }

    // ── Runtime single-thread ──
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let recv_cfg = &config.receiver;
        let notifier = Notifier::from_config(&recv_cfg.notifications);
        let pipeline = Pipeline::new(WebSocketConnector, notifier, recv_cfg);

        // Consumidor headless: acompanha estado e última amostra
        let mut state_rx = pipeline.subscribe_state();
        let mut history_rx = pipeline.subscribe_history();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = state_rx.borrow_and_update().clone();
                        match state.last_error {
                            Some(err) => info!("Estado: {} (último erro: {err})", state.status),
                            None => info!("Estado: {}", state.status),
                        }
                    }
                    changed = history_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let history = history_rx.borrow_and_update();
                        if let Some(last) = history.last() {
                            debug!(
                                "Histórico {} amostras | CPU {:.1}% MEM {:.1}% DISK {:.1}%",
                                history.len(),
                                last.cpu,
                                last.memory,
                                last.disk
                            );
                        }
                    }
                }
            }
        });

        // ── Ctrl-C → stop() ──
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C recebido, encerrando...");
                    signal.cancel();
                }
                Err(e) => warn!("Não foi possível escutar Ctrl-C: {e}"),
            }
        });

        info!("Receiver iniciado → {}", recv_cfg.url);
        pipeline.run(shutdown).await;
    });

    Ok(())
}
