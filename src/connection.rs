use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{AlertError, Result};
use crate::protocol::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Identity announced by the server during the connect handshake
pub(crate) struct Hello {
    pub id: String,
    pub name: Option<String>,
}

/// One TCP session speaking the line-delimited alert protocol
///
/// Outgoing messages go through an unbounded channel drained by a writer
/// task, so sending never blocks the owner. Inbound messages are read one
/// line at a time by the owning task.
pub(crate) struct Session {
    peer: String,
    tx: mpsc::UnboundedSender<Message>,
    writer: tokio::task::JoinHandle<()>,
    reader: BufReader<OwnedReadHalf>,
}

impl Session {
    /// Open a session to `address:port` within a finite connect timeout
    pub async fn connect(address: &str, port: u16) -> Result<Self> {
        let peer = format!("{}:{}", address, port);
        tracing::debug!("Connecting to {}", peer);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| AlertError::Timeout)??;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(write_loop(write_half, rx, peer.clone()));

        Ok(Self {
            peer,
            tx,
            writer,
            reader: BufReader::new(read_half),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Clone of the outbound message handle
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.tx.clone()
    }

    /// Read the server's hello line
    pub async fn handshake(&mut self) -> Result<Hello> {
        match timeout(HANDSHAKE_TIMEOUT, self.next_message()).await {
            Err(_) => Err(AlertError::Timeout),
            Ok(Ok(Some(Message::Hello { id, name }))) => Ok(Hello { id, name }),
            Ok(Ok(Some(other))) => Err(AlertError::InvalidMessage(format!(
                "expected hello, got {:?}",
                other
            ))),
            Ok(Ok(None)) => Err(AlertError::ConnectionClosed),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Read the next inbound message; `None` on clean EOF
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Message::from_line(&line).map(Some)
    }

    /// Close the session, waiting briefly for the writer to flush
    ///
    /// Every sender clone handed out via [`Session::sender`] must already be
    /// dropped, otherwise the writer task keeps draining until they are.
    pub async fn close(self) {
        let Session {
            peer, tx, writer, ..
        } = self;
        drop(tx);

        if timeout(CLOSE_TIMEOUT, writer).await.is_err() {
            tracing::debug!("Writer for {} did not finish in time", peer);
        }
    }
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Message>,
    peer: String,
) {
    while let Some(msg) = rx.recv().await {
        let line = match msg.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode message for {}: {}", peer, e);
                continue;
            }
        };

        if let Err(e) = write.write_all(line.as_bytes()).await {
            tracing::debug!("Failed to send message to {}: {}", peer, e);
            break;
        }
    }

    let _ = write.shutdown().await;
}
