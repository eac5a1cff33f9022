use async_trait::async_trait;
use recgate::call::CallEvent;
use recgate::config::{GatewayConfig, RecorderConfig};
use recgate::protocol::{CallDirection, CallPriority, Command, PttType, Response};
use recgate::recorder::Error;
use recgate::{
    CallInfo, CallRegistry, CallSupervisor, ConferenceBus, RecorderLink, RecordingSession,
    ResourceKind, SessionStatus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted recorder: answers commands from a canned response list
/// (defaulting to Ok) and records everything that was sent.
struct MockLink {
    sent: Mutex<Vec<String>>,
    frames: Mutex<Vec<Vec<u8>>>,
    script: Mutex<VecDeque<Response>>,
    /// One-shot overrides keyed by command prefix, checked before the
    /// ordered script.
    overrides: Mutex<Vec<(String, Response)>>,
}

impl MockLink {
    fn new(script: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            overrides: Mutex::new(Vec::new()),
        })
    }

    fn respond_once(&self, prefix: &str, response: Response) {
        self.overrides
            .lock()
            .unwrap()
            .push((prefix.to_string(), response));
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_matching(&self, prefix: &str) -> usize {
        self.sent()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait]
impl RecorderLink for MockLink {
    async fn send_command(&self, cmd: &Command) -> Response {
        self.sent
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&cmd.payload).into_owned());
        if !cmd.expects_response {
            return Response::Ok;
        }

        let payload = String::from_utf8_lossy(&cmd.payload).into_owned();
        let mut overrides = self.overrides.lock().unwrap();
        if let Some(pos) = overrides.iter().position(|(p, _)| payload.starts_with(p)) {
            return overrides.remove(pos).1;
        }
        drop(overrides);

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Response::Ok)
    }

    fn send_frame(&self, cmd: &Command) {
        self.frames.lock().unwrap().push(cmd.payload.clone());
    }
}

struct Harness {
    session: Arc<RecordingSession>,
    link: Arc<MockLink>,
    registry: Arc<CallRegistry>,
    bus: Arc<ConferenceBus>,
}

fn harness(kind: ResourceKind, script: Vec<Response>) -> Harness {
    let gateway = GatewayConfig {
        terminal_id: "GW01".into(),
        ip_address: "10.0.0.5".into(),
    };
    let recorder = RecorderConfig {
        address: "127.0.0.1:9".into(),
        notice_port: 65001,
        response_timeout_secs: 3,
        tries: 3,
        idle_refresh_secs: 15,
        media_gap_ms: 0,
    };

    let registry = Arc::new(CallRegistry::new());
    let bus = Arc::new(ConferenceBus::new(registry.clone()));
    let link = MockLink::new(script);

    let session = Arc::new(RecordingSession::new(
        kind,
        &gateway,
        recorder,
        link.clone(),
        bus.clone(),
        registry.clone(),
    ));

    Harness {
        session,
        link,
        registry,
        bus,
    }
}

async fn wait_for_status(session: &RecordingSession, status: SessionStatus) {
    for _ in 0..2000 {
        if session.status() == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "session never reached {:?}, stuck at {:?}",
        status,
        session.status()
    );
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

async fn settle() {
    // Let the worker drain anything already queued
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn session_establishes_on_start() {
    let h = harness(ResourceKind::Telephony, vec![]);

    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    let sent = h.link.sent();
    assert_eq!(sent[0], "V,I00,GW01-TEL,10.0.0.5");
    assert_eq!(sent[1], "V,T01,GW01-TEL");
    assert_eq!(sent[2], "V,T00,GW01-TEL");

    h.session.shutdown().await;
    // Shutdown drops the recorder-side object
    assert_eq!(h.link.sent_matching("V,DDD"), 1);
}

#[tokio::test(start_paused = true)]
async fn radio_session_uses_radio_opcodes() {
    let h = harness(ResourceKind::Radio, vec![]);

    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    let sent = h.link.sent();
    assert_eq!(sent[0], "V,I00,GW01-RAD,10.0.0.5");
    assert_eq!(sent[1], "V,G01,GW01-RAD");
    assert_eq!(sent[2], "V,G00,GW01-RAD");

    h.session.shutdown().await;
}

#[tokio::test]
async fn events_rejected_while_not_open() {
    let h = harness(ResourceKind::Telephony, vec![]);

    assert_eq!(h.session.record(true), Err(Error::SessionNotOpen));
    assert_eq!(
        h.session.signal_call_connected("112200"),
        Err(Error::SessionNotOpen)
    );
    assert!(h.link.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_response_forces_reset_then_recovery() {
    // First NotifyIp goes unanswered; every later command succeeds.
    let h = harness(ResourceKind::Telephony, vec![Response::NoResponse]);

    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    // The failed cycle dropped the recording object before retrying
    assert!(h.link.sent_matching("V,DDD") >= 1);
    assert_eq!(h.link.sent_matching("V,I00"), 2);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lost_session_reply_reopens_the_session() {
    let h = harness(ResourceKind::Telephony, vec![]);
    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    // Fake a confirmed call so Record passes admission, then have the
    // recorder claim the session is gone.
    let supervisor = CallSupervisor::new(h.registry.clone(), h.session.clone(), h.bus.clone());
    supervisor.call_created(CallInfo {
        slot: 0,
        direction: CallDirection::Incoming,
        priority: CallPriority::Normal,
        origin: "112100".into(),
        destination: "112200".into(),
    });
    h.link.respond_once("V,I01", Response::NoActiveSession);
    supervisor.on_call_event(0, CallEvent::Confirmed);

    // The rejected Record triggers a full reset cycle
    wait_until(|| h.link.sent_matching("V,I00") == 2).await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ptt_edges_collapse_per_frequency() {
    let h = harness(ResourceKind::Radio, vec![]);
    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    h.session
        .signal_ptt(true, "121.500", 1, PttType::Normal)
        .unwrap();
    h.session
        .signal_ptt(true, "121.500", 2, PttType::Normal)
        .unwrap();
    settle().await;

    // One aggregate key-down: one PTT on, one Record
    assert_eq!(h.link.sent_matching("V,T20"), 1);
    assert_eq!(h.link.sent_matching("V,I01"), 1);
    assert!(h.session.is_recording());

    h.session
        .signal_ptt(false, "121.500", 1, PttType::Normal)
        .unwrap();
    settle().await;
    // Device 2 still keys the frequency
    assert_eq!(h.link.sent_matching("V,T21"), 0);
    assert!(h.session.is_recording());

    h.session
        .signal_ptt(false, "121.500", 2, PttType::Normal)
        .unwrap();
    settle().await;
    assert_eq!(h.link.sent_matching("V,T21"), 1);
    assert_eq!(h.link.sent_matching("V,I02"), 1);
    assert!(!h.session.is_recording());

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn squelch_is_masked_while_ptt_active() {
    let h = harness(ResourceKind::Radio, vec![]);
    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    h.session
        .signal_ptt(true, "121.500", 1, PttType::Normal)
        .unwrap();
    h.session
        .signal_squelch(true, "121.500", "RX-A", "BSS", 10)
        .unwrap();
    settle().await;

    // Transmission masks reception: no squelch command on the wire
    assert_eq!(h.link.sent_matching("V,G02"), 0);

    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn media_frames_dropped_until_recording() {
    let h = harness(ResourceKind::Telephony, vec![]);
    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    // No confirmed call: the self-heal Record is enqueued but rejected by
    // admission, and the frame itself is dropped.
    h.session.put_media_frame(&[0i16; 160]);
    settle().await;
    assert_eq!(h.frame_count_via_link(), 0);
    assert_eq!(h.link.sent_matching("V,I01"), 0);

    let supervisor = CallSupervisor::new(h.registry.clone(), h.session.clone(), h.bus.clone());
    supervisor.call_created(CallInfo {
        slot: 0,
        direction: CallDirection::Outgoing,
        priority: CallPriority::Normal,
        origin: "112100".into(),
        destination: "112200".into(),
    });
    supervisor.on_call_event(0, CallEvent::Confirmed);
    settle().await;

    assert_eq!(h.link.sent_matching("V,T02"), 1);
    assert_eq!(h.link.sent_matching("V,T04"), 1);
    assert_eq!(h.link.sent_matching("V,I01"), 1);
    assert!(h.session.is_recording());

    h.session.put_media_frame(&[0i16; 160]);
    assert_eq!(h.frame_count_via_link(), 1);

    h.session.shutdown().await;
}

impl Harness {
    fn frame_count_via_link(&self) -> usize {
        self.link.frame_count()
    }
}

#[tokio::test(start_paused = true)]
async fn call_end_pauses_before_signalling() {
    let h = harness(ResourceKind::Telephony, vec![]);
    h.session.start().await;
    wait_for_status(&h.session, SessionStatus::Open).await;

    let supervisor = CallSupervisor::new(h.registry.clone(), h.session.clone(), h.bus.clone());
    supervisor.call_created(CallInfo {
        slot: 3,
        direction: CallDirection::Incoming,
        priority: CallPriority::Urgent,
        origin: "112100".into(),
        destination: "112200".into(),
    });
    supervisor.on_call_event(3, CallEvent::Confirmed);
    settle().await;
    assert!(h.session.is_recording());

    supervisor.on_call_event(
        3,
        CallEvent::Disconnected {
            cause: 16,
            disc_origin: 1,
        },
    );
    settle().await;

    assert_eq!(h.link.sent_matching("V,I02"), 1);
    assert_eq!(h.link.sent_matching("V,T03"), 1);
    assert!(!h.session.is_recording());
    assert_eq!(h.registry_confirmed(), 0);

    h.session.shutdown().await;
}

impl Harness {
    fn registry_confirmed(&self) -> usize {
        use recgate::CallDirectory;
        self.registry.confirmed_calls()
    }
}
