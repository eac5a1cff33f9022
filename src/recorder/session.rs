use super::frequency::FrequencyActivityTracker;
use super::queue::CommandQueues;
use crate::call::CallDirectory;
use crate::config::{GatewayConfig, RecorderConfig};
use crate::protocol::{CallDirection, CallPriority, Command, CommandKind, PttType, Response};
use crate::transport::RecorderLink;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Which recorder-side resource a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Telephony,
    Radio,
}

impl ResourceKind {
    fn suffix(self) -> &'static str {
        match self {
            ResourceKind::Telephony => "-TEL",
            ResourceKind::Radio => "-RAD",
        }
    }

    fn is_radio(self) -> bool {
        matches!(self, ResourceKind::Radio)
    }
}

/// Recording-session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    IpSent,
    Open,
    Closed,
    Error,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("recording session is not open")]
    SessionNotOpen,
    #[error("recorder command queue is full")]
    QueueFull,
    #[error("recording session entered error state")]
    SessionError,
    #[error("timed out waiting for session status {0:?}")]
    WaitTimeout(SessionStatus),
    #[error("recording session is shutting down")]
    Shutdown,
}

/// Bus-side capability the session uses to wire its tracked audio sources
/// to or away from the recording port when Record/Pause take effect.
pub trait RecorderWiring: Send + Sync {
    fn bridge_recorder_sources(&self, kind: ResourceKind, on: bool);
}

/// Point-in-time snapshot of a session, for diagnostics.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub resource: ResourceKind,
    pub status: SessionStatus,
    pub recording: bool,
    pub queued_commands: usize,
    pub started_at: DateTime<Utc>,
}

struct Inner {
    kind: ResourceKind,
    /// Terminal identifier with the resource suffix, e.g. "GW01-TEL".
    terminal: String,
    gateway_ip: String,
    cfg: RecorderConfig,
    link: Arc<dyn RecorderLink>,
    wiring: Arc<dyn RecorderWiring>,
    calls: Arc<dyn CallDirectory>,
    queues: CommandQueues,
    status_tx: watch::Sender<SessionStatus>,
    tracker: StdMutex<FrequencyActivityTracker>,
    /// 0 = not recording. Telephony uses 0/1; radio tracks the aggregate
    /// PTT+squelch count so Pause admission can detect the falling edge.
    recording_level: AtomicUsize,
    media_seq: AtomicU32,
    /// When the last control command was sent; gates the media path.
    last_command: StdMutex<Option<Instant>>,
    running: AtomicBool,
    reset_pending: AtomicBool,
    reset: Notify,
    /// Idle-refresh watchdog deadline; None while disarmed.
    idle_deadline: StdMutex<Option<tokio::time::Instant>>,
    watchdog_change: Notify,
    started_at: DateTime<Utc>,
}

/// One logical recording session with the external recorder.
///
/// Owns a command worker, a session controller reacting to error/reset
/// events, and an idle watchdog. All public operations are non-blocking
/// except the explicit `wait` variants, which are bounded by
/// `tries x response_timeout`.
pub struct RecordingSession {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RecordingSession {
    pub fn new(
        kind: ResourceKind,
        gateway: &GatewayConfig,
        cfg: RecorderConfig,
        link: Arc<dyn RecorderLink>,
        wiring: Arc<dyn RecorderWiring>,
        calls: Arc<dyn CallDirectory>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);

        let inner = Arc::new(Inner {
            kind,
            terminal: format!("{}{}", gateway.terminal_id, kind.suffix()),
            gateway_ip: gateway.ip_address.clone(),
            cfg,
            link,
            wiring,
            calls,
            queues: CommandQueues::new(),
            status_tx,
            tracker: StdMutex::new(FrequencyActivityTracker::new()),
            recording_level: AtomicUsize::new(0),
            media_seq: AtomicU32::new(0),
            last_command: StdMutex::new(None),
            running: AtomicBool::new(true),
            reset_pending: AtomicBool::new(false),
            reset: Notify::new(),
            idle_deadline: StdMutex::new(None),
            watchdog_change: Notify::new(),
            started_at: Utc::now(),
        });

        Self {
            inner,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker, controller and watchdog tasks and kick off the
    /// initial NotifyIp -> CloseSession -> OpenSession establishment.
    pub async fn start(&self) {
        info!("Starting recording session {}", self.inner.terminal);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(worker_loop(Arc::clone(&self.inner))));
        tasks.push(tokio::spawn(controller_loop(Arc::clone(&self.inner))));
        tasks.push(tokio::spawn(watchdog_loop(Arc::clone(&self.inner))));
        drop(tasks);

        self.inner.trigger_reset();
    }

    /// Stop all loops, join them, then best-effort drop the recording
    /// object on the recorder side.
    pub async fn shutdown(&self) {
        info!("Stopping recording session {}", self.inner.terminal);

        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.queues.wake();
        self.inner.reset.notify_one();
        self.inner.watchdog_change.notify_one();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Recording session task panicked: {}", e);
            }
        }

        let _ = self
            .inner
            .link
            .send_command(&Command::remove_object(&self.inner.terminal))
            .await;
    }

    /// Drop all session state and re-run the establishment cycle, e.g.
    /// after the recorder announces it restarted.
    pub fn force_reset(&self) {
        self.inner.trigger_reset();
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn resource_kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording_level.load(Ordering::SeqCst) > 0
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            resource: self.inner.kind,
            status: self.status(),
            recording: self.is_recording(),
            queued_commands: self.inner.queues.len(),
            started_at: self.inner.started_at,
        }
    }

    /// Announce the gateway IP to the recorder.
    pub async fn notify_ip(&self, wait: bool) -> Result<(), Error> {
        self.inner.notify_ip(wait).await
    }

    /// Open the recording session for this resource.
    pub async fn open_session(&self, wait: bool) -> Result<(), Error> {
        self.inner.session(true, wait).await
    }

    /// Close the recording session for this resource.
    pub async fn close_session(&self, wait: bool) -> Result<(), Error> {
        self.inner.session(false, wait).await
    }

    /// Drop the recorder-side recording object (used while resetting).
    pub fn remove_object(&self) -> Result<(), Error> {
        self.inner
            .push_normal(Command::remove_object(&self.inner.terminal))
    }

    /// Ask the recording service itself to restart.
    pub fn recorder_reset_request(&self) -> Result<(), Error> {
        self.inner.push_normal(Command::reset())
    }

    /// Enqueue Record (`on`) or Pause (`!on`). The worker applies the
    /// call/PTT admission rules before anything reaches the wire.
    pub fn record(&self, on: bool) -> Result<(), Error> {
        self.inner.record(on)
    }

    /// Telephony call started. No-op on the radio resource.
    pub fn signal_call_start(
        &self,
        direction: CallDirection,
        priority: CallPriority,
        origin: &str,
        destination: &str,
    ) -> Result<(), Error> {
        if self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;
        self.inner.push_normal(Command::call_start(
            &self.inner.terminal,
            direction,
            priority,
            origin,
            destination,
        ))
    }

    /// Telephony call ended: recording is cut before the event is queued.
    pub fn signal_call_end(&self, cause: u32, disc_origin: u32) -> Result<(), Error> {
        if self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;
        let _ = self.inner.record(false);
        self.inner.push_normal(Command::call_end(
            &self.inner.terminal,
            cause,
            disc_origin,
        ))
    }

    /// Telephony call answered: recording starts once the event is queued.
    pub fn signal_call_connected(&self, connected: &str) -> Result<(), Error> {
        if self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;
        self.inner
            .push_normal(Command::call_connected(&self.inner.terminal, connected))?;
        self.inner.record(true)
    }

    /// Telephony hold transition. Recording pauses across a hold and
    /// resumes on retrieve.
    pub fn signal_hold(&self, on: bool, caller: bool) -> Result<(), Error> {
        if self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;

        if on {
            self.inner.record(false)?;
            self.inner
                .push_normal(Command::hold_on(&self.inner.terminal, caller))
        } else {
            self.inner
                .push_normal(Command::hold_off(&self.inner.terminal))?;
            self.inner.record(true)
        }
    }

    /// Radio PTT edge for one device. Forwarded to the recorder only when
    /// the frequency's aggregate keying state flips. No-op on telephony.
    pub fn signal_ptt(
        &self,
        on: bool,
        freq: &str,
        device: u32,
        ptt_type: PttType,
    ) -> Result<(), Error> {
        if !self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;

        let changed = self.inner.tracker.lock().unwrap().set_ptt(freq, device, on);
        if !changed {
            return Ok(());
        }

        if on {
            self.inner.record(true)?;
        }
        let cmd = if on {
            Command::ptt_on(&self.inner.terminal, freq, ptt_type)
        } else {
            Command::ptt_off(&self.inner.terminal, freq)
        };
        self.inner.push_normal(cmd)?;
        if !on {
            self.inner.record(false)?;
        }
        Ok(())
    }

    /// Radio squelch edge with its best-signal selection. Forwarded only on
    /// a net state change; squelch is masked while PTT is active on the
    /// frequency. No-op on telephony.
    pub fn signal_squelch(
        &self,
        on: bool,
        freq: &str,
        resource_id: &str,
        method: &str,
        quality_idx: u32,
    ) -> Result<(), Error> {
        if !self.inner.kind.is_radio() {
            return Ok(());
        }
        self.inner.require_open()?;

        let (changed, bss_changed) = self
            .inner
            .tracker
            .lock()
            .unwrap()
            .set_squelch(freq, on, resource_id, method, quality_idx);

        if bss_changed {
            debug!(
                "Best-signal selection on {} now {} ({})",
                freq, resource_id, method
            );
        }
        if !changed {
            return Ok(());
        }

        if on {
            self.inner.record(true)?;
        }
        let cmd = if on {
            Command::squelch_on(&self.inner.terminal, freq)
        } else {
            Command::squelch_off(&self.inner.terminal, freq)
        };
        self.inner.push_normal(cmd)?;
        if !on {
            self.inner.record(false)?;
        }
        Ok(())
    }

    /// Real-time media path. Never blocks: the frame is either sent at once
    /// or dropped. Frames are dropped while the session is not open, while
    /// the resource is not recording, and inside the configured gap after a
    /// control command send.
    pub fn put_media_frame(&self, samples: &[i16]) {
        let inner = &self.inner;

        if *inner.status_tx.borrow() != SessionStatus::Open {
            return;
        }

        if inner.recording_level.load(Ordering::SeqCst) == 0 {
            // Media with no active Record: re-derive it from live state
            // instead of sending; the worker's admission rules decide.
            if inner.kind.is_radio() {
                let (ptt, squ) = inner.tracker.lock().unwrap().counts();
                if ptt + squ > 0 {
                    let _ = inner.record(true);
                }
            } else {
                let _ = inner.record(true);
            }
            return;
        }

        // Keep media out of the wire while a command exchange may still be
        // settling on the recorder side.
        {
            let mut last = inner.last_command.lock().unwrap();
            if let Some(at) = *last {
                let gap = inner.cfg.media_gap() + inner.cfg.media_gap() / 10;
                if at.elapsed() < gap {
                    return;
                }
                *last = None;
            }
        }

        let seq = inner.media_seq.fetch_add(1, Ordering::SeqCst);
        inner
            .link
            .send_frame(&Command::media(&inner.terminal, seq, samples));
    }
}

impl Inner {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: SessionStatus) {
        self.status_tx.send_replace(status);
    }

    fn require_open(&self) -> Result<(), Error> {
        if *self.status_tx.borrow() == SessionStatus::Open {
            Ok(())
        } else {
            Err(Error::SessionNotOpen)
        }
    }

    fn push_normal(&self, cmd: Command) -> Result<(), Error> {
        if self.queues.push_normal(cmd) {
            Ok(())
        } else {
            error!("Recorder command queue full on {}", self.terminal);
            Err(Error::QueueFull)
        }
    }

    fn record(&self, on: bool) -> Result<(), Error> {
        self.require_open()?;
        self.media_seq.store(0, Ordering::SeqCst);
        let cmd = if on {
            Command::record(&self.terminal)
        } else {
            Command::pause(&self.terminal)
        };
        if self.queues.push_priority(cmd) {
            Ok(())
        } else {
            error!("Record/Pause queue full on {}", self.terminal);
            Err(Error::QueueFull)
        }
    }

    async fn notify_ip(&self, wait: bool) -> Result<(), Error> {
        self.push_normal(Command::notify_ip(&self.terminal, &self.gateway_ip))?;
        if wait {
            self.wait_for_status(SessionStatus::IpSent).await?;
        }
        Ok(())
    }

    async fn session(&self, open: bool, wait: bool) -> Result<(), Error> {
        let cmd = if open {
            Command::open_session(&self.terminal, self.kind.is_radio())
        } else {
            Command::close_session(&self.terminal, self.kind.is_radio())
        };
        self.push_normal(cmd)?;
        if wait {
            let target = if open {
                SessionStatus::Open
            } else {
                SessionStatus::Closed
            };
            self.wait_for_status(target).await?;
        }
        Ok(())
    }

    async fn wait_for_status(&self, target: SessionStatus) -> Result<(), Error> {
        let mut rx = self.status_tx.subscribe();
        let wait = rx.wait_for(|s| *s == target || *s == SessionStatus::Error);

        let result = tokio::time::timeout(self.cfg.wait_budget(), wait).await;
        let reached = match result {
            Err(_) => return Err(Error::WaitTimeout(target)),
            Ok(Err(_)) => return Err(Error::Shutdown),
            Ok(Ok(status)) => *status == target,
        };
        if reached {
            Ok(())
        } else {
            Err(Error::SessionError)
        }
    }

    /// Mark the session failed and wake the controller. Safe to call from
    /// any task; concurrent triggers coalesce into one reset cycle.
    fn trigger_reset(&self) {
        self.set_status(SessionStatus::Error);
        self.reset_pending.store(true, Ordering::SeqCst);
        self.reset.notify_one();
    }

    fn arm_watchdog(&self) {
        let deadline = tokio::time::Instant::now() + self.cfg.idle_refresh();
        *self.idle_deadline.lock().unwrap() = Some(deadline);
        self.watchdog_change.notify_one();
    }

    fn cancel_watchdog(&self) {
        *self.idle_deadline.lock().unwrap() = None;
        self.watchdog_change.notify_one();
    }

    /// Admission filter run just before a popped command is sent. Returns
    /// false to drop the command without touching the wire.
    fn admit(&self, cmd: &Command) -> bool {
        match cmd.kind {
            CommandKind::Record => match self.kind {
                ResourceKind::Telephony => {
                    if self.recording_level.load(Ordering::SeqCst) > 0 {
                        return false;
                    }
                    // Record only makes sense with live call media behind it
                    if self.calls.confirmed_calls() == 0 {
                        return false;
                    }
                    self.recording_level.store(1, Ordering::SeqCst);
                    true
                }
                ResourceKind::Radio => {
                    if self.recording_level.load(Ordering::SeqCst) > 0 {
                        return false;
                    }
                    self.recording_level.store(1, Ordering::SeqCst);
                    true
                }
            },
            CommandKind::Pause => match self.kind {
                ResourceKind::Telephony => {
                    if self.calls.confirmed_calls() > 0
                        || self.recording_level.load(Ordering::SeqCst) == 0
                    {
                        return false;
                    }
                    self.recording_level.store(0, Ordering::SeqCst);
                    self.wiring.bridge_recorder_sources(self.kind, false);
                    true
                }
                ResourceKind::Radio => {
                    let previous = self.recording_level.load(Ordering::SeqCst);
                    let (ptt, squ) = self.tracker.lock().unwrap().counts();
                    self.recording_level.store(ptt + squ, Ordering::SeqCst);
                    if ptt + squ > 0 || previous == 0 {
                        return false;
                    }
                    self.wiring.bridge_recorder_sources(self.kind, false);
                    true
                }
            },
            CommandKind::HoldOn => {
                // A hold command interrupts the recorder mid-call; with a
                // second confirmed call up it would cut that call's audio.
                self.calls.confirmed_calls() <= 1
            }
            _ => true,
        }
    }

    /// Interpret the recorder's reply: drive the status machine, wire the
    /// Record/Pause side effects, decide whether a reset is needed.
    fn apply_response(&self, cmd: &Command, response: Response) {
        let mut reset_needed = false;

        if response == Response::NoResponse {
            error!(
                "Recorder did not respond to {} on {}",
                cmd.describe(),
                self.terminal
            );
            reset_needed = true;
        } else {
            match cmd.kind {
                CommandKind::CloseSession => {
                    if matches!(response, Response::Ok | Response::NoActiveSession) {
                        self.set_status(SessionStatus::Closed);
                    } else {
                        error!("Recording session on {} cannot be closed", self.terminal);
                        self.set_status(SessionStatus::Error);
                        reset_needed = true;
                    }
                }
                CommandKind::OpenSession => {
                    if matches!(response, Response::Ok | Response::SessionAlreadyOpen) {
                        self.set_status(SessionStatus::Open);
                    } else {
                        error!("Recording session on {} cannot be opened", self.terminal);
                        self.set_status(SessionStatus::Error);
                        reset_needed = true;
                    }
                }
                CommandKind::NotifyIp => {
                    if response == Response::Ok {
                        self.set_status(SessionStatus::IpSent);
                    } else {
                        error!("Recorder rejected gateway IP for {}", self.terminal);
                        self.set_status(SessionStatus::Error);
                    }
                }
                CommandKind::RemoveObject => {
                    if response == Response::Ok {
                        self.set_status(SessionStatus::Idle);
                    } else {
                        error!("Recorder kept recording object for {}", self.terminal);
                        self.set_status(SessionStatus::Error);
                    }
                }
                _ => {
                    if matches!(
                        response,
                        Response::NoActiveSession | Response::CannotOpenSession
                    ) {
                        // The recorder lost our session underneath us
                        reset_needed = true;
                    } else if cmd.kind == CommandKind::Record {
                        if response == Response::Ok {
                            self.wiring.bridge_recorder_sources(self.kind, true);
                        } else {
                            error!("Recorder rejected Record on {}", self.terminal);
                            // Cleared so the next media frame retries Record
                            self.recording_level.store(0, Ordering::SeqCst);
                        }
                    } else if response != Response::Ok {
                        warn!(
                            "Recorder answered {:?} to {} on {}",
                            response,
                            cmd.describe(),
                            self.terminal
                        );
                    }
                }
            }
        }

        if reset_needed {
            self.trigger_reset();
        } else {
            // An acknowledged command means the recorder is alive; the
            // idle-refresh watchdog can stand down.
            self.cancel_watchdog();
        }

        *self.last_command.lock().unwrap() = Some(Instant::now());
    }
}

/// Pops commands (priority lane first), applies admission rules, sends with
/// retries and interprets the response.
async fn worker_loop(inner: Arc<Inner>) {
    debug!("Command worker started for {}", inner.terminal);

    while inner.running() {
        let cmd = loop {
            if let Some(cmd) = inner.queues.pop() {
                break cmd;
            }
            inner.queues.wait().await;
            if !inner.running() {
                debug!("Command worker stopped for {}", inner.terminal);
                return;
            }
        };

        if !inner.admit(&cmd) {
            continue;
        }

        debug!("Sending {} for {}", cmd.describe(), inner.terminal);
        let response = inner.link.send_command(&cmd).await;
        inner.apply_response(&cmd, response);
    }

    debug!("Command worker stopped for {}", inner.terminal);
}

/// Reacts to the error/reset event: clears all derived state and re-runs the
/// establishment sequence until it sticks.
async fn controller_loop(inner: Arc<Inner>) {
    debug!("Session controller started for {}", inner.terminal);

    while inner.running() {
        while !inner.reset_pending.swap(false, Ordering::SeqCst) {
            inner.reset.notified().await;
            if !inner.running() {
                return;
            }
        }

        inner.cancel_watchdog();
        inner.set_status(SessionStatus::Idle);

        // Let any in-flight command exchange settle before wiping state
        tokio::time::sleep(Duration::from_secs(1)).await;
        if !inner.running() {
            return;
        }

        inner.queues.drain();
        inner.recording_level.store(0, Ordering::SeqCst);
        inner.tracker.lock().unwrap().clear();
        inner.arm_watchdog();
        inner.set_status(SessionStatus::Idle);

        info!("Re-establishing recording session {}", inner.terminal);

        let established = establish(&inner).await;
        if established.is_err() {
            // Go around again; the 1s settle above paces the retries
            inner.trigger_reset();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn establish(inner: &Arc<Inner>) -> Result<(), Error> {
    if let Err(e) = inner.notify_ip(true).await {
        warn!("NotifyIp failed on {}: {}", inner.terminal, e);
        let _ = inner.push_normal(Command::remove_object(&inner.terminal));
        return Err(e);
    }

    if let Err(e) = inner.session(false, true).await {
        warn!("CloseSession failed on {}: {}", inner.terminal, e);
        let _ = inner.push_normal(Command::remove_object(&inner.terminal));
        return Err(e);
    }

    if let Err(e) = inner.session(true, true).await {
        warn!("OpenSession failed on {}: {}", inner.terminal, e);
        let _ = inner.push_normal(Command::remove_object(&inner.terminal));
        return Err(e);
    }

    info!("Recording session {} open", inner.terminal);
    Ok(())
}

/// Idle-refresh watchdog: while armed, forces a session reset if no command
/// is acknowledged before the deadline. Keeps the session fresh against a
/// recorder that was silently restarted.
async fn watchdog_loop(inner: Arc<Inner>) {
    loop {
        let deadline = *inner.idle_deadline.lock().unwrap();
        if !inner.running() {
            return;
        }

        match deadline {
            None => {
                inner.watchdog_change.notified().await;
            }
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        if !inner.running() {
                            return;
                        }
                        let fire = {
                            let mut slot = inner.idle_deadline.lock().unwrap();
                            if *slot == Some(deadline) {
                                *slot = None;
                                true
                            } else {
                                false
                            }
                        };
                        if fire {
                            warn!(
                                "No recorder acknowledgement within idle window on {}",
                                inner.terminal
                            );
                            inner.trigger_reset();
                        }
                    }
                    _ = inner.watchdog_change.notified() => {}
                }
            }
        }
    }
}
