//! # Telemetria Sender
//!
//! Coleta métricas do host e transmite via WebSocket para todos os
//! receivers conectados, um frame JSON por intervalo.
//!
//! ## Uso
//! ```bash
//! telemetry_sender                 # config.toml ao lado do executável
//! telemetry_sender --port 9000     # sobrescreve sender.port
//! ```

mod monitor;

use anyhow::{Context, bail};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use monitor::HardwareMonitor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_core::config::AppConfig;
use telemetry_core::encode_sample;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Frames guardados para clientes lentos antes de descartar.
const FRAME_BUFFER: usize = 16;

#[derive(Debug, Parser)]
#[command(name = "telemetry_sender", version, about = "Telemetria Sender")]
struct Cli {
    /// Caminho do config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Porta TCP (sobrescreve a config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // ── Carregar config ──
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(port) = cli.port {
        config.sender.port = port;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("Configuração inválida ({} erros)", errors.len());
    }

    let sender_cfg = &config.sender;
    let bind_addr = format!("{}:{}", sender_cfg.bind_ip, sender_cfg.port);
    let interval = Duration::from_secs_f64(sender_cfg.interval_secs);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Falha ao escutar em {bind_addr}"))?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA SENDER – ATIVO (WebSocket)");
    println!("══════════════════════════════════════════════");
    println!("  Endereço:  ws://{bind_addr}");
    println!("  Intervalo: {:.1}s", sender_cfg.interval_secs);
    println!("  Protocolo: JSON");
    println!("══════════════════════════════════════════════");
    println!();

    let (frames, _) = broadcast::channel::<String>(FRAME_BUFFER);
    tokio::spawn(collect_loop(frames.clone(), interval));

    // ── Aceitar receivers ──
    loop {
        match listener.accept().await {
            Ok((tcp, addr)) => {
                tokio::spawn(serve_client(tcp, addr, frames.subscribe()));
            }
            Err(e) => warn!("Erro ao aceitar conexão: {e}"),
        }
    }
}

/// Coleta uma amostra por intervalo e publica para todos os clientes.
async fn collect_loop(frames: broadcast::Sender<String>, interval: Duration) {
    let mut hw = HardwareMonitor::new();
    info!("Hardware monitor inicializado");

    // Primeira leitura para inicializar contadores
    let _ = hw.collect();

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let sample = hw.collect();
        match encode_sample(&sample) {
            Ok(frame) => {
                debug!(
                    "→ {} clientes | CPU {:.1}% | MEM {:.0}% | DISK {:.0}% | NET {:.1} KiB/s",
                    frames.receiver_count(),
                    sample.cpu,
                    sample.memory,
                    sample.disk,
                    sample.network
                );
                // Sem clientes o envio falha; a amostra é simplesmente descartada
                let _ = frames.send(frame);
            }
            Err(e) => error!("Erro ao serializar amostra: {e}"),
        }
    }
}

/// Atende um receiver até ele desconectar.
async fn serve_client(tcp: TcpStream, addr: SocketAddr, mut frames: broadcast::Receiver<String>) {
    let ws = match accept_async(tcp).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake WebSocket falhou com {addr}: {e}");
            return;
        }
    };
    info!("Receiver conectado: {addr}");

    let (mut sink, mut incoming) = ws.split();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(json) => {
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        debug!("Falha ao enviar para {addr}: {e}");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("{addr} atrasado, {skipped} frames descartados");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Erro de leitura de {addr}: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Receiver desconectado: {addr}");
}
