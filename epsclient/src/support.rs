use std::error;
use std::fmt;
use std::io;

use step::{StepError, StepFault};

pub type EpsResult<T> = Result<T, EpsError>;

/// Client-library error taxonomy. Every variant renders a stable message
/// and maps to a numeric code in the 0x2001_xxxx namespace (codec faults
/// keep their 0x2002_xxxx codes).
#[derive(Debug, Clone, PartialEq)]
pub enum EpsError {
    OperSystem(String),
    Socket(String),
    SocketTimeout,
    InvalidParm(&'static str),
    DuplicateInited(&'static str),
    Uninited(&'static str),
    InvalidConnMode,
    InvalidHid,
    DuplicateRegistered(&'static str),
    InvalidMktType,
    UnexpectedMsgType(String),
    InvalidAddress,
    DuplicateConnect,
    MktTypeUnsubscribed,
    MktDataBackflow,
    DataSourceChanged,
    MktTypeDupSubscribed,
    InvalidOperation(String),
    LoginFailed,
    SubMarketDataFailed,
    CheckKeepaliveTimeout,
    HidCountBeyondLimit,
    MktStatusUnchanged,
    Step(StepError),
}

impl EpsError {
    pub fn code(&self) -> u32 {
        match self {
            EpsError::OperSystem(_) => 0x2001_0001,
            EpsError::Socket(_) => 0x2001_0002,
            EpsError::SocketTimeout => 0x2001_0003,
            EpsError::InvalidParm(_) => 0x2001_0004,
            EpsError::DuplicateInited(_) => 0x2001_0005,
            EpsError::Uninited(_) => 0x2001_0006,
            EpsError::InvalidConnMode => 0x2001_0007,
            EpsError::InvalidHid => 0x2001_0008,
            EpsError::DuplicateRegistered(_) => 0x2001_0009,
            EpsError::InvalidMktType => 0x2001_000a,
            EpsError::UnexpectedMsgType(_) => 0x2001_000b,
            EpsError::InvalidAddress => 0x2001_000c,
            EpsError::DuplicateConnect => 0x2001_000d,
            EpsError::MktTypeUnsubscribed => 0x2001_000e,
            EpsError::MktDataBackflow => 0x2001_000f,
            EpsError::DataSourceChanged => 0x2001_0010,
            EpsError::MktTypeDupSubscribed => 0x2001_0011,
            EpsError::InvalidOperation(_) => 0x2001_0012,
            EpsError::LoginFailed => 0x2001_0013,
            EpsError::SubMarketDataFailed => 0x2001_0014,
            EpsError::CheckKeepaliveTimeout => 0x2001_0015,
            EpsError::HidCountBeyondLimit => 0x2001_0016,
            EpsError::MktStatusUnchanged => 0x2001_0017,
            EpsError::Step(err) => err.code(),
        }
    }
}

impl fmt::Display for EpsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpsError::OperSystem(detail) => write!(f, "operation system error, {}", detail),
            EpsError::Socket(detail) => write!(f, "socket error, {}", detail),
            EpsError::SocketTimeout => write!(f, "socket timeout"),
            EpsError::InvalidParm(name) => write!(f, "invalid param ({})", name),
            EpsError::DuplicateInited(what) => write!(f, "{} already initialized", what),
            EpsError::Uninited(what) => write!(f, "{} uninitialized", what),
            EpsError::InvalidConnMode => write!(f, "invalid connection mode"),
            EpsError::InvalidHid => write!(f, "invalid hid"),
            EpsError::DuplicateRegistered(what) => write!(f, "{} already registered", what),
            EpsError::InvalidMktType => write!(f, "invalid market type"),
            EpsError::UnexpectedMsgType(what) => write!(f, "unexpected message type({})", what),
            EpsError::InvalidAddress => write!(f, "invalid address"),
            EpsError::DuplicateConnect => write!(f, "connect already"),
            EpsError::MktTypeUnsubscribed => write!(f, "market not subscribed"),
            EpsError::MktDataBackflow => write!(f, "market data backflow"),
            EpsError::DataSourceChanged => write!(f, "data source changed"),
            EpsError::MktTypeDupSubscribed => write!(f, "market duplicate subscribed"),
            EpsError::InvalidOperation(detail) => write!(f, "invalid operation, {}", detail),
            EpsError::LoginFailed => write!(f, "login failed"),
            EpsError::SubMarketDataFailed => write!(f, "subscribe market data failed"),
            EpsError::CheckKeepaliveTimeout => write!(f, "check keepalive timeout"),
            EpsError::HidCountBeyondLimit => {
                write!(f, "handle count beyond limit({})", HANDLE_MAX_COUNT)
            }
            EpsError::MktStatusUnchanged => write!(f, "market status unchanged"),
            EpsError::Step(err) => err.fmt(f),
        }
    }
}

impl error::Error for EpsError {}

impl From<StepError> for EpsError {
    #[inline]
    fn from(err: StepError) -> Self {
        EpsError::Step(err)
    }
}

impl From<StepFault> for EpsError {
    #[inline]
    fn from(fault: StepFault) -> Self {
        EpsError::Step(StepError::Fatal(fault))
    }
}

impl From<io::Error> for EpsError {
    #[inline]
    fn from(err: io::Error) -> Self {
        EpsError::Socket(err.to_string())
    }
}

/// Result code passed to user callbacks; zero is success.
pub const NO_ERR: u32 = 0;

/// Handle slots available per process.
pub const HANDLE_MAX_COUNT: usize = 32;

/// Socket receive buffer (SO_RCVBUF).
pub const SOCKET_RECV_BUFFER_LEN: usize = 4096 * 1024;
/// Receive timeout per worker iteration; also the keepalive tick.
pub const SOCKET_RECV_TIMEOUT_MS: u64 = 1000;
/// Delay between reconnect attempts.
pub const CHANNEL_RECONNECT_INTL_MS: u64 = 1000;
/// Sleep while a channel sits idle.
pub const CHANNEL_IDLE_INTL_MS: u64 = 500;
/// Receive silence threshold that raises a keepalive warning.
pub const DRIVER_KEEPALIVE_TIME_MS: u64 = 35 * 1000;

/// Outbound send queue capacity (TCP).
pub const SEND_QUEUE_SIZE: usize = 128;
/// Control event queue capacity (UDP).
pub const EVENT_QUEUE_SIZE: usize = 128;
/// Largest single item accepted by the send queue.
pub const SEND_DATA_MAX_LEN: usize = 8192;
/// One socket read.
pub const RECV_CHUNK_LEN: usize = 64 * 1024;
/// Reassembly buffer cap, two socket reads.
pub const RECV_BUFFER_LEN: usize = 2 * RECV_CHUNK_LEN;
