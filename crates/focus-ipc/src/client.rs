//! IPC client implementation

use focus_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{IpcError, IpcResult};

/// IPC client for the UI, the block surface and the platform shim
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let json = serde_json::to_string(&request)?;
        let response = self.send_raw_line(&json).await?;

        if response.request_id != request_id && response.request_id != 0 {
            return Err(IpcError::InvalidMessage(format!(
                "response for request {} while waiting for {}",
                response.request_id, request_id
            )));
        }
        Ok(response)
    }

    /// Send a command and unwrap the payload, turning error responses into
    /// [`IpcError::Rejected`]
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(e) => Err(IpcError::Rejected {
                code: e.code,
                message: e.message,
            }),
        }
    }

    /// Write one line verbatim and read one response line
    pub async fn send_raw_line(&mut self, line: &str) -> IpcResult<Response> {
        let mut msg = line.trim_end().to_string();
        msg.push('\n');
        self.writer.write_all(msg.as_bytes()).await?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        Ok(serde_json::from_str(reply.trim())?)
    }

    /// Subscribe to events and consume this client to return an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.call(Command::SubscribeEvents).await?;

        Ok(EventStream {
            reader: self.reader,
        })
    }
}

/// Stream of events from focusd
pub struct EventStream {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let event: Event = serde_json::from_str(line.trim())?;
        Ok(event)
    }
}
