//! Socket abstraction
//!
//! The driver talks to a socket through a pair of channels. The production
//! [`TungsteniteConnector`] runs a pump task that bridges those channels to a
//! real WebSocket; tests supply their own [`Connector`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame as WsClose};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Close code and reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Frames exchanged between the driver and a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Transport-level ping
    Ping(Vec<u8>),
    Close(Option<CloseFrame>),
}

/// Open socket as seen by the driver
///
/// Dropping `outgoing` closes the socket. `incoming` ends when the peer
/// closes or the transport fails.
#[derive(Debug)]
pub struct Socket {
    pub outgoing: mpsc::UnboundedSender<Frame>,
    pub incoming: mpsc::UnboundedReceiver<Frame>,
}

/// Opens sockets for the driver
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> ClientResult<Socket>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> ClientResult<Socket> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(stream, outgoing_rx, incoming_tx));

        Ok(Socket {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

async fn pump<S>(
    stream: S,
    mut outgoing: mpsc::UnboundedReceiver<Frame>,
    incoming: mpsc::UnboundedSender<Frame>,
) where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let message = match frame {
                    Some(Frame::Text(text)) => Message::Text(text),
                    Some(Frame::Ping(payload)) => Message::Ping(payload),
                    Some(Frame::Close(close)) => {
                        let _ = write.send(Message::Close(close.map(to_ws_close))).await;
                        break;
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = write.send(message).await {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if incoming.send(Frame::Text(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        let close = close.map(|c| CloseFrame::new(u16::from(c.code), c.reason));
                        let _ = incoming.send(Frame::Close(close));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Pings are answered by tungstenite; binary frames are not part of the protocol
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

fn to_ws_close(frame: CloseFrame) -> WsClose<'static> {
    WsClose {
        code: CloseCode::from(frame.code),
        reason: frame.reason.into(),
    }
}
