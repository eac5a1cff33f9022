//! Top-level wiring: one gateway owns the conference bus, both recording
//! sessions and the restart-notice listener.

use crate::bus::ConferenceBus;
use crate::call::{CallRegistry, CallSupervisor};
use crate::config::Config;
use crate::protocol::RESTART_NOTICE;
use crate::recorder::{RecordingSession, ResourceKind, SessionStats};
use crate::transport::UdpRecorderLink;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Gateway {
    config: Config,
    bus: Arc<ConferenceBus>,
    telephony: Arc<RecordingSession>,
    radio: Arc<RecordingSession>,
    supervisor: CallSupervisor,
    notice_task: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// Bind the recorder links and build the full object graph. Nothing
    /// talks to the recorder until [`start`](Self::start).
    pub async fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(CallRegistry::new());
        let bus = Arc::new(ConferenceBus::new(registry.clone()));

        let tel_link = UdpRecorderLink::connect(
            &config.recorder.address,
            config.recorder.tries,
            config.recorder.response_timeout(),
        )
        .await
        .context("creating telephony recorder link")?;
        let rad_link = UdpRecorderLink::connect(
            &config.recorder.address,
            config.recorder.tries,
            config.recorder.response_timeout(),
        )
        .await
        .context("creating radio recorder link")?;

        let telephony = Arc::new(RecordingSession::new(
            ResourceKind::Telephony,
            &config.gateway,
            config.recorder.clone(),
            Arc::new(tel_link),
            bus.clone(),
            registry.clone(),
        ));
        let radio = Arc::new(RecordingSession::new(
            ResourceKind::Radio,
            &config.gateway,
            config.recorder.clone(),
            Arc::new(rad_link),
            bus.clone(),
            registry.clone(),
        ));

        let supervisor = CallSupervisor::new(registry, telephony.clone(), bus.clone());

        Ok(Self {
            config,
            bus,
            telephony,
            radio,
            supervisor,
            notice_task: Mutex::new(None),
        })
    }

    /// Start both sessions and the listener for the recorder's unsolicited
    /// restart notice.
    pub async fn start(&self) -> Result<()> {
        info!(
            "Starting recording gateway {} -> {}",
            self.config.gateway.terminal_id, self.config.recorder.address
        );

        self.telephony.start().await;
        self.radio.start().await;

        let notice_addr = format!("0.0.0.0:{}", self.config.recorder.notice_port);
        let socket = UdpSocket::bind(&notice_addr)
            .await
            .with_context(|| format!("binding restart-notice socket on {notice_addr}"))?;

        let telephony = self.telephony.clone();
        let radio = self.radio.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let len = match socket.recv(&mut buf).await {
                    Ok(len) => len,
                    Err(e) => {
                        error!("Restart-notice socket failed: {}", e);
                        break;
                    }
                };

                if &buf[..len] == RESTART_NOTICE {
                    // The recorder restarted underneath us: both sessions
                    // are gone on its side, re-establish them.
                    warn!("Recorder restart notice received, resetting sessions");
                    telephony.force_reset();
                    radio.force_reset();
                } else {
                    warn!(
                        "Unexpected datagram on restart-notice port: {:?}",
                        &buf[..len.min(16)]
                    );
                }
            }
        });
        *self.notice_task.lock().await = Some(task);

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Stopping recording gateway");

        if let Some(task) = self.notice_task.lock().await.take() {
            task.abort();
        }
        self.telephony.shutdown().await;
        self.radio.shutdown().await;
    }

    pub fn bus(&self) -> &Arc<ConferenceBus> {
        &self.bus
    }

    pub fn supervisor(&self) -> &CallSupervisor {
        &self.supervisor
    }

    pub fn telephony(&self) -> &Arc<RecordingSession> {
        &self.telephony
    }

    pub fn radio(&self) -> &Arc<RecordingSession> {
        &self.radio
    }

    pub fn stats(&self) -> Vec<SessionStats> {
        vec![self.telephony.stats(), self.radio.stats()]
    }
}
