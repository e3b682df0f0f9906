//! IPC server implementation

use focus_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response,
};
use focus_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Requests larger than this are dropped with an error response
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// Message from client to server
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// Role for a peer: root and the daemon's own user may control the engine,
/// anyone else may only watch.
pub fn role_for_uid(uid: Option<u32>, daemon_uid: u32) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Admin,
        Some(u) if u == daemon_uid => ClientRole::Admin,
        Some(_) => ClientRole::Observer,
        // No credentials: treat as the UI shell of this user
        None => ClientRole::Shell,
    }
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Remove a stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);

        Ok(())
    }

    /// Get receiver for server messages
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        let daemon_uid = nix::unistd::getuid().as_raw();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid, daemon_uid);

                    let info = ClientInfo::new(role);
                    let info = match uid {
                        Some(u) => info.with_uid(u),
                        None => info,
                    };

                    debug!(client_id = %client_id, uid = ?uid, role = ?role, "Accepted connection");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                    subscribed: false,
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let client_id_reader = client_id.clone();

        // Reader task
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut buf = Vec::new();

            loop {
                match read_bounded_line(&mut reader, &mut buf, MAX_REQUEST_BYTES).await {
                    Ok(LineRead::Eof) => {
                        debug!(client_id = %client_id_reader, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(LineRead::Oversized(n)) => {
                        warn!(client_id = %client_id_reader, bytes = n, "Oversized request dropped");
                        reject_line(&response_tx, "Request too large");
                    }
                    Ok(LineRead::Line) => {
                        let Ok(line) = std::str::from_utf8(&buf) else {
                            reject_line(&response_tx, "Request is not valid UTF-8");
                            continue;
                        };

                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<Request>(trimmed) {
                            Ok(request) => {
                                let subscription = match request.command {
                                    Command::SubscribeEvents => Some(true),
                                    Command::UnsubscribeEvents => Some(false),
                                    _ => None,
                                };
                                if let Some(subscribed) = subscription {
                                    let mut clients = clients.write().await;
                                    if let Some(handle) = clients.get_mut(&client_id_reader) {
                                        handle.subscribed = subscribed;
                                    }
                                }

                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: client_id_reader.clone(),
                                    request,
                                });
                            }
                            Err(e) => {
                                warn!(
                                    client_id = %client_id_reader,
                                    error = %e,
                                    "Invalid request"
                                );
                                reject_line(&response_tx, &format!("Invalid request: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %client_id_reader, error = %e, "Read error");
                        break;
                    }
                }
            }
        });

        // Writer task
        let mut event_rx = self.event_tx.subscribe();
        let clients_writer = self.clients.clone();
        let client_id_writer = client_id;
        let message_tx_writer = self.message_tx.clone();

        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    // A response is always written before events it caused
                    biased;

                    Some(response) = response_rx.recv() => {
                        let mut msg = response;
                        msg.push('\n');
                        if let Err(e) = writer.write_all(msg.as_bytes()).await {
                            debug!(client_id = %client_id_writer, error = %e, "Write error");
                            break;
                        }
                    }

                    received = event_rx.recv() => {
                        let event = match received {
                            Ok(event) => event,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(client_id = %client_id_writer, skipped, "Subscriber lagging, events dropped");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };

                        let is_subscribed = {
                            let clients = clients_writer.read().await;
                            clients.get(&client_id_writer).is_some_and(|h| h.subscribed)
                        };

                        if is_subscribed && let Ok(json) = serde_json::to_string(&event) {
                            let mut msg = json;
                            msg.push('\n');
                            if let Err(e) = writer.write_all(msg.as_bytes()).await {
                                debug!(client_id = %client_id_writer, error = %e, "Event write error");
                                break;
                            }
                        }
                    }

                    else => break,
                }
            }

            let _ = message_tx_writer.send(ServerMessage::ClientDisconnected {
                client_id: client_id_writer.clone(),
            });

            let mut clients = clients_writer.write().await;
            clients.remove(&client_id_writer);
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Sender half for components that publish events without holding the server
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum LineRead {
    Eof,
    /// A complete line is in the buffer
    Line,
    /// The line ran past the limit and was discarded; carries its length
    Oversized(usize),
}

/// Read one newline-terminated line into `buf`, buffering at most
/// `limit + 1` bytes. The rest of a longer line is skipped without being kept.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', buf)
        .await?;

    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if n <= limit || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Line);
    }

    buf.clear();
    let mut total = n;
    loop {
        let (used, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                break;
            }
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (chunk.len(), false),
            }
        };
        reader.consume(used);
        total += used;
        if done {
            break;
        }
    }
    Ok(LineRead::Oversized(total))
}

/// Answer a line that never became a request. Request id 0 marks it as
/// uncorrelated.
fn reject_line(response_tx: &mpsc::UnboundedSender<String>, message: &str) {
    let response = Response::error(0, ErrorInfo::new(ErrorCode::InvalidRequest, message));
    if let Ok(json) = serde_json::to_string(&response) {
        let _ = response_tx.send(json);
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}
