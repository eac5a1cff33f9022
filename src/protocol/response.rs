/// Unsolicited notice on the fixed port: the recording service restarted.
pub const RESTART_NOTICE: &[u8] = b"G,T11";

/// Replies from the recording service on the command socket.
///
/// `NoResponse` is synthesized by the transport when the response timeout
/// expires; it never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    BadRequest,
    NoActiveSession,
    Overflow,
    CommandNotSupported,
    SessionAlreadyOpen,
    CannotOpenSession,
    NoResponse,
    Malformed,
}

impl Response {
    /// Parse a datagram received on the command socket.
    pub fn parse(data: &[u8]) -> Response {
        match data {
            b"G,E00,0" => Response::Ok,
            b"G,E00,1" => Response::BadRequest,
            b"G,E00,2" => Response::NoActiveSession,
            b"G,E00,3" => Response::Overflow,
            b"G,E00,4" => Response::CommandNotSupported,
            b"G,E00,5" => Response::SessionAlreadyOpen,
            b"G,E00,6" => Response::CannotOpenSession,
            _ => Response::Malformed,
        }
    }
}
