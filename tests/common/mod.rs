#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lanalert::{AlertDevice, DeviceScanListener, Message};

/// Poll until `condition` holds or a 5 second deadline passes
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Scan listener recording every found device and completion
#[derive(Default)]
pub struct RecordingScanListener {
    pub found: Mutex<Vec<Arc<AlertDevice>>>,
    pub finished: Mutex<usize>,
}

impl RecordingScanListener {
    pub fn found_count(&self) -> usize {
        self.found.lock().unwrap().len()
    }

    pub fn finished_count(&self) -> usize {
        *self.finished.lock().unwrap()
    }
}

impl DeviceScanListener for RecordingScanListener {
    fn on_device_found(&self, device: Arc<AlertDevice>) {
        self.found.lock().unwrap().push(device);
    }

    fn on_scan_finished(&self) {
        *self.finished.lock().unwrap() += 1;
    }
}

/// Server that greets every connection with a hello and then holds it open,
/// draining inbound lines
pub async fn spawn_hello_server(
    bind_addr: &str,
    id: &str,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    let id = id.to_string();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };

            let hello = Message::Hello {
                id: id.clone(),
                name: None,
            }
            .to_line()
            .unwrap();

            if stream.write_all(hello.as_bytes()).await.is_err() {
                continue;
            }

            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            });
        }
    });

    Ok((addr, handle))
}

/// Server that accepts connections but never sends a hello, so probes and
/// handshakes run into their timeouts
pub async fn spawn_silent_server(bind_addr: &str) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            held.push(stream);
        }
    });

    Ok((addr, handle))
}

/// A scriptable single-device alert server
///
/// Messages sent through `to_client` go to the currently-connected client;
/// a `Bye` is followed by the server closing the connection. Everything the
/// client sends is collected in `received`.
pub struct ScriptedServer {
    pub addr: SocketAddr,
    pub to_client: mpsc::UnboundedSender<Message>,
    pub received: Arc<Mutex<Vec<Message>>>,
    pub connections: Arc<Mutex<usize>>,
}

impl ScriptedServer {
    pub fn received_messages(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

pub async fn spawn_scripted_server(id: &str) -> std::io::Result<ScriptedServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let (to_client, mut outbound) = mpsc::unbounded_channel::<Message>();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(Mutex::new(0usize));

    let id = id.to_string();
    let received_task = received.clone();
    let connections_task = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            *connections_task.lock().unwrap() += 1;

            let (read_half, mut write_half) = stream.into_split();

            let hello = Message::Hello {
                id: id.clone(),
                name: None,
            }
            .to_line()
            .unwrap();

            if write_half.write_all(hello.as_bytes()).await.is_err() {
                continue;
            }

            let mut reader = BufReader::new(read_half);
            let mut inbound_line = String::new();
            loop {
                inbound_line.clear();
                tokio::select! {
                    out = outbound.recv() => match out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Bye);
                            let encoded = msg.to_line().unwrap();
                            if write_half.write_all(encoded.as_bytes()).await.is_err() {
                                break;
                            }
                            if closing {
                                break;
                            }
                        }
                        None => break,
                    },
                    read = reader.read_line(&mut inbound_line) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if let Ok(msg) = Message::from_line(&inbound_line) {
                                received_task.lock().unwrap().push(msg);
                            }
                        }
                    }
                }
            }
        }
    });

    Ok(ScriptedServer {
        addr,
        to_client,
        received,
        connections,
    })
}
