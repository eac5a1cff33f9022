use super::alaw;

/// Direction of a telephony call, as encoded in the CallStart event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl CallDirection {
    fn digit(self) -> char {
        match self {
            CallDirection::Incoming => '1',
            CallDirection::Outgoing => '2',
        }
    }
}

/// Call priority, as encoded in the CallStart event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPriority {
    Emergency,
    Urgent,
    Normal,
    NonUrgent,
}

impl CallPriority {
    fn digit(self) -> char {
        match self {
            CallPriority::Emergency => '1',
            CallPriority::Urgent => '2',
            CallPriority::Normal => '3',
            CallPriority::NonUrgent => '4',
        }
    }
}

/// PTT key type, as encoded in the PTT-on event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttType {
    Normal,
    Coupling,
    Priority,
    Emergency,
}

impl PttType {
    fn digit(self) -> char {
        match self {
            PttType::Normal => '1',
            PttType::Coupling => '2',
            PttType::Priority => '3',
            PttType::Emergency => '4',
        }
    }
}

/// Command kinds understood by the recording service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    NotifyIp,
    OpenSession,
    CloseSession,
    RemoveObject,
    Record,
    Pause,
    PttOn,
    PttOff,
    SquelchOn,
    SquelchOff,
    CallStart,
    CallEnd,
    CallConnected,
    HoldOn,
    HoldOff,
    Reset,
    Media,
}

/// An encoded control command or media frame bound for the recorder.
///
/// The payload holds the full wire image: ASCII fields for control commands,
/// ASCII header plus A-law bytes for media frames.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: Vec<u8>,
    pub expects_response: bool,
}

impl Command {
    fn control(kind: CommandKind, line: String) -> Self {
        Self {
            kind,
            payload: line.into_bytes(),
            expects_response: true,
        }
    }

    pub fn notify_ip(terminal: &str, ip: &str) -> Self {
        Self::control(CommandKind::NotifyIp, format!("V,I00,{terminal},{ip}"))
    }

    pub fn open_session(terminal: &str, radio: bool) -> Self {
        let code = if radio { "G00" } else { "T00" };
        Self::control(CommandKind::OpenSession, format!("V,{code},{terminal}"))
    }

    pub fn close_session(terminal: &str, radio: bool) -> Self {
        let code = if radio { "G01" } else { "T01" };
        Self::control(CommandKind::CloseSession, format!("V,{code},{terminal}"))
    }

    pub fn remove_object(terminal: &str) -> Self {
        Self::control(CommandKind::RemoveObject, format!("V,DDD,{terminal}"))
    }

    pub fn record(terminal: &str) -> Self {
        Self::control(CommandKind::Record, format!("V,I01,{terminal}"))
    }

    pub fn pause(terminal: &str) -> Self {
        Self::control(CommandKind::Pause, format!("V,I02,{terminal}"))
    }

    pub fn ptt_on(terminal: &str, freq: &str, ptt_type: PttType) -> Self {
        Self::control(
            CommandKind::PttOn,
            format!("V,T20,{terminal},{freq},{}", ptt_type.digit()),
        )
    }

    pub fn ptt_off(terminal: &str, freq: &str) -> Self {
        Self::control(CommandKind::PttOff, format!("V,T21,{terminal},{freq}"))
    }

    pub fn squelch_on(terminal: &str, freq: &str) -> Self {
        Self::control(CommandKind::SquelchOn, format!("V,G02,{terminal},{freq}"))
    }

    pub fn squelch_off(terminal: &str, freq: &str) -> Self {
        Self::control(CommandKind::SquelchOff, format!("V,G03,{terminal},{freq}"))
    }

    pub fn call_start(
        terminal: &str,
        direction: CallDirection,
        priority: CallPriority,
        origin: &str,
        destination: &str,
    ) -> Self {
        Self::control(
            CommandKind::CallStart,
            format!(
                "V,T02,{terminal},{},{},tel:{origin},tel:{destination}",
                direction.digit(),
                priority.digit()
            ),
        )
    }

    pub fn call_end(terminal: &str, cause: u32, disc_origin: u32) -> Self {
        Self::control(
            CommandKind::CallEnd,
            format!("V,T03,{terminal},{cause},{disc_origin}"),
        )
    }

    pub fn call_connected(terminal: &str, connected: &str) -> Self {
        Self::control(
            CommandKind::CallConnected,
            format!("V,T04,{terminal},tel:{connected}"),
        )
    }

    /// Hold on carries the initiator digit (1 = caller, 2 = callee).
    pub fn hold_on(terminal: &str, caller: bool) -> Self {
        let who = if caller { '1' } else { '2' };
        Self::control(CommandKind::HoldOn, format!("V,T08,{terminal},{who}"))
    }

    pub fn hold_off(terminal: &str) -> Self {
        Self::control(CommandKind::HoldOff, format!("V,T09,{terminal}"))
    }

    /// Full reset request to the recording service itself.
    pub fn reset() -> Self {
        Self::control(CommandKind::Reset, "C,H02".to_string())
    }

    /// A-law encoded media frame. Sent fire-and-forget, never queued.
    pub fn media(terminal: &str, sequence: u32, samples: &[i16]) -> Self {
        let mut payload = format!("V,MMM,{terminal},{sequence},").into_bytes();
        payload.extend(alaw::encode(samples));
        Self {
            kind: CommandKind::Media,
            payload,
            expects_response: false,
        }
    }

    /// The wire image as text, for logging. Media payload bytes are elided.
    pub fn describe(&self) -> String {
        if self.kind == CommandKind::Media {
            format!("media frame ({} bytes)", self.payload.len())
        } else {
            String::from_utf8_lossy(&self.payload).into_owned()
        }
    }
}
