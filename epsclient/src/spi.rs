//! User-facing data types and the callback interface. All callbacks are
//! invoked from the handle's worker thread; a `code` of zero means
//! success, anything else is a value from the error taxonomy.

use crate::support::{EpsError, EpsResult};
use step::message::{MdSnapshotRecord, TradingStatusRecord};
use step::StepFault;

/// Transport selected when a handle is opened, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    Udp,
    Tcp,
}

/// Market classes carried by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MktType {
    /// Every concrete market; valid for subscription only.
    All,
    /// Stocks (indices included).
    Stk,
    /// Derivatives.
    Dev,
}

impl MktType {
    /// Concrete markets, excluding `All`.
    pub const COUNT: usize = 2;

    /// Slot index for per-market state; `All` has none.
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            MktType::All => None,
            MktType::Stk => Some(0),
            MktType::Dev => Some(1),
        }
    }

    /// Tag 167 wire code.
    pub fn code(self) -> &'static str {
        match self {
            MktType::All => "00",
            MktType::Stk => "01",
            MktType::Dev => "02",
        }
    }

    pub fn from_code(code: &str) -> Option<MktType> {
        match code {
            "00" => Some(MktType::All),
            "01" => Some(MktType::Stk),
            "02" => Some(MktType::Dev),
            _ => None,
        }
    }

    pub fn concrete() -> [MktType; MktType::COUNT] {
        [MktType::Stk, MktType::Dev]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrdSesMode {
    Testing = 1,
    Simulated = 2,
    Production = 3,
}

impl TrdSesMode {
    pub fn from_wire(value: i16) -> EpsResult<TrdSesMode> {
        match value {
            1 => Ok(TrdSesMode::Testing),
            2 => Ok(TrdSesMode::Simulated),
            3 => Ok(TrdSesMode::Production),
            _ => Err(EpsError::from(StepFault::InvalidFieldValue {
                tag: 339,
                value: value.to_string(),
                reason: "unknown trade session mode",
            })),
        }
    }
}

/// Severity of an `on_event_occurred` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Information = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

/// One full-refresh snapshot as delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct MktData {
    /// First eight characters of the wire SendingTime.
    pub mkt_time: String,
    pub mkt_type: MktType,
    pub trad_ses_mode: TrdSesMode,
    pub appl_id: u32,
    pub appl_seq_num: u64,
    /// YYYYMMDD.
    pub trade_date: String,
    pub md_update_type: String,
    pub md_count: u32,
    /// Opaque payload, passed through undecoded.
    pub md_data: Vec<u8>,
}

/// One market phase change as delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct MktStatus {
    pub mkt_type: MktType,
    pub trad_ses_mode: TrdSesMode,
    pub mkt_status: String,
    pub tot_no_related_sym: u32,
}

pub(crate) fn snapshot_mkt_type(record: &MdSnapshotRecord) -> EpsResult<MktType> {
    match MktType::from_code(&record.security_type) {
        Some(MktType::All) | None => Err(EpsError::InvalidMktType),
        Some(mkt) => Ok(mkt),
    }
}

pub(crate) fn status_mkt_type(record: &TradingStatusRecord) -> EpsResult<MktType> {
    match MktType::from_code(&record.security_type) {
        Some(MktType::All) | None => Err(EpsError::InvalidMktType),
        Some(mkt) => Ok(mkt),
    }
}

/// Application callback interface. Every method has an empty default so
/// implementors override only what they need.
pub trait ClientSpi: Send + Sync {
    fn on_connected(&self, _hid: u32) {}

    fn on_disconnected(&self, _hid: u32, _code: u32, _reason: &str) {}

    fn on_login_rsp(&self, _hid: u32, _heartbeat_intl: u16, _code: u32, _reason: &str) {}

    fn on_logout_rsp(&self, _hid: u32, _code: u32, _reason: &str) {}

    fn on_mkt_data_sub_rsp(&self, _hid: u32, _mkt_type: MktType, _code: u32, _reason: &str) {}

    fn on_mkt_data_arrived(&self, _hid: u32, _data: &MktData) {}

    fn on_mkt_status_changed(&self, _hid: u32, _status: &MktStatus) {}

    fn on_event_occurred(&self, _hid: u32, _kind: EventKind, _code: u32, _text: &str) {}
}

/// Placeholder SPI installed until the application registers one.
pub(crate) struct NullSpi;

impl ClientSpi for NullSpi {}
