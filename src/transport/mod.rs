//! UDP transport to the recording service
//!
//! One ephemeral socket per resource carries control commands and media
//! frames. Replies are read by a background task and handed to the single
//! in-flight `send_command` call; the recorder never pipelines responses.

use crate::protocol::{Command, Response};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Transport seam between a recording session and the recorder.
///
/// The UDP implementation is the production path; tests substitute a mock
/// link with scripted responses.
#[async_trait]
pub trait RecorderLink: Send + Sync {
    /// Send a control command and wait for the recorder's reply, retrying
    /// up to the configured try count. Returns `Response::NoResponse` when
    /// every try times out.
    async fn send_command(&self, cmd: &Command) -> Response;

    /// Fire-and-forget send for media frames. Must never block.
    fn send_frame(&self, cmd: &Command);
}

/// UDP implementation of [`RecorderLink`].
pub struct UdpRecorderLink {
    socket: Arc<UdpSocket>,
    responses: Mutex<mpsc::Receiver<Response>>,
    tries: u32,
    response_timeout: Duration,
    recv_task: JoinHandle<()>,
}

impl UdpRecorderLink {
    /// Bind an ephemeral local port and connect it to the recorder address.
    pub async fn connect(
        recorder_addr: &str,
        tries: u32,
        response_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("binding recorder command socket")?;
        socket
            .connect(recorder_addr)
            .await
            .with_context(|| format!("connecting command socket to {recorder_addr}"))?;

        let socket = Arc::new(socket);
        let (tx, rx) = mpsc::channel(8);

        let recv_socket = Arc::clone(&socket);
        let recv_task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let len = match recv_socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(e) => {
                        error!("Recorder socket receive failed: {}", e);
                        break;
                    }
                };

                let response = Response::parse(&buf[..len]);
                if response == Response::Overflow {
                    // Overflow reports media loss, it never answers a command
                    warn!("Recorder reports media overflow");
                    continue;
                }

                if tx.send(response).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            socket,
            responses: Mutex::new(rx),
            tries,
            response_timeout,
            recv_task,
        })
    }
}

#[async_trait]
impl RecorderLink for UdpRecorderLink {
    async fn send_command(&self, cmd: &Command) -> Response {
        let mut rx = self.responses.lock().await;

        // Drop replies left over from a previous timed-out command
        while rx.try_recv().is_ok() {}

        for _ in 0..self.tries {
            if let Err(e) = self.socket.send(&cmd.payload).await {
                error!("Failed to send command to recorder: {}", e);
                continue;
            }

            if !cmd.expects_response {
                return Response::Ok;
            }

            match tokio::time::timeout(self.response_timeout, rx.recv()).await {
                Ok(Some(Response::Malformed)) => {
                    warn!("Malformed response from recorder, retrying");
                }
                Ok(Some(response)) => return response,
                Ok(None) => return Response::NoResponse,
                Err(_) => {
                    debug!("Recorder response timeout for {}", cmd.describe());
                }
            }
        }

        Response::NoResponse
    }

    fn send_frame(&self, cmd: &Command) {
        // Called from the media path; try_send keeps it non-blocking
        if let Err(e) = self.socket.try_send(&cmd.payload) {
            if e.kind() != std::io::ErrorKind::WouldBlock {
                warn!("Failed to send media frame to recorder: {}", e);
            }
        }
    }
}

impl Drop for UdpRecorderLink {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}
