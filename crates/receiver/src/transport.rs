//! Transporte WebSocket que entrega eventos brutos para o pipeline.
//!
//! Cada conexão vira um stream de [`TransportEvent`] que sempre termina com
//! exatamente um [`TransportEvent::Closed`]. Um erro é entregue antes do
//! fechamento, como dois sinais separados.
//!
//! O socket pertence a uma task de leitura. Quando o pipeline descarta o
//! stream, a task envia um frame `Close` e espera o fim do handshake.

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use std::time::Duration;
use telemetry_core::TransportError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Tempo máximo esperando a resposta ao nosso `Close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Evento vindo de um transporte aberto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Payload bruto de um frame de dados.
    Message(Vec<u8>),
    /// Erro no link. O fechamento vem em seguida.
    Error(TransportError),
    /// Link encerrado (erro ou servidor).
    Closed,
}

pub type EventStream = BoxStream<'static, TransportEvent>;

/// Abre transportes. Implementado pelo WebSocket real e por fakes nos testes.
pub trait Connector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<EventStream, TransportError>>;
}

/// Conector WebSocket (`ws://` / `wss://` via rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<EventStream, TransportError>> {
        open_websocket(url).boxed()
    }
}

async fn open_websocket(url: String) -> Result<EventStream, TransportError> {
    let (ws_stream, _response) =
        connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(ws_stream, tx));

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    Ok(events.boxed())
}

/// Lê o socket até ele fechar ou até o receptor dos eventos ser descartado.
async fn pump(mut ws: WsStream, events: mpsc::UnboundedSender<TransportEvent>) {
    loop {
        tokio::select! {
            _ = events.closed() => {
                close_gracefully(&mut ws).await;
                return;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.into_bytes()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Message(bytes));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Servidor encerrou o WebSocket");
                }
                Some(Ok(_)) => {
                    // Ping/Pong tratados pelo tungstenite
                }
                Some(Err(e)) => {
                    // Após o primeiro erro o socket não é mais lido
                    let err = TransportError::Stream(e.to_string());
                    let _ = events.send(TransportEvent::Error(err));
                    break;
                }
                None => break,
            },
        }
    }

    let _ = events.send(TransportEvent::Closed);
}

async fn close_gracefully(ws: &mut WsStream) {
    if let Err(e) = ws.close(None).await {
        debug!("Falha ao enviar Close: {e}");
        return;
    }
    let drained = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while ws.next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!("Servidor não respondeu ao Close em {CLOSE_TIMEOUT:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // Porta reservada e fechada logo em seguida
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketConnector.connect(format!("ws://{addr}")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn delivers_frames_then_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text("primeiro".into())).await.unwrap();
            ws.send(Message::Binary(b"segundo".to_vec())).await.unwrap();
            ws.close(None).await.unwrap();
            // Aguarda a resposta do handshake de fechamento
            while ws.next().await.is_some() {}
        });

        let events: Vec<TransportEvent> = WebSocketConnector
            .connect(format!("ws://{addr}"))
            .await
            .unwrap()
            .collect()
            .await;
        server.await.unwrap();

        assert_eq!(
            events,
            vec![
                TransportEvent::Message(b"primeiro".to_vec()),
                TransportEvent::Message(b"segundo".to_vec()),
                TransportEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn wss_url_starts_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Lê o primeiro byte do cliente e derruba a conexão
        let server = tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            tcp.read_u8().await.unwrap()
        });

        let result = WebSocketConnector.connect(format!("wss://{addr}/metrics")).await;
        let first_byte = server.await.unwrap();

        // 0x16 = registro TLS de handshake (ClientHello)
        assert_eq!(first_byte, 0x16);
        match result {
            Err(TransportError::Connect { reason, .. }) => {
                assert!(!reason.contains("TLS support not compiled in"), "{reason}");
            }
            other => panic!("esperado erro de conexão, veio {:?}", other.map(|_| "<stream>")),
        }
    }

    #[tokio::test]
    async fn dropping_stream_sends_close_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.next().await
        });

        let events = WebSocketConnector
            .connect(format!("ws://{addr}"))
            .await
            .unwrap();
        drop(events);

        let first = server.await.unwrap();
        assert!(matches!(first, Some(Ok(Message::Close(_)))), "{first:?}");
    }
}
