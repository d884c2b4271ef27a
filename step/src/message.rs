//! STEP message model: the FIXT.1.1 session header plus one body record
//! per message type. Fields that may legitimately be absent on the wire
//! are `Option` (numerics, flags) or empty (strings); the validator
//! decides which of them a given message type actually requires.

/// Session-layer constants.
pub const BEGIN_STRING: &str = "FIXT.1.1";
pub const SENDER_COMP_ID: &str = "OEPS.1.1";
pub const TARGET_COMP_ID: &str = "EzEI.1.1";
pub const MSG_ENCODING: &str = "GBK";
pub const DEFAULT_APPLVER_ID: &str = "9";
pub const DEFAULT_APPLEXT_ID: u32 = 124;

pub const SECURITY_TYPE_ALL: &str = "00";
pub const SECURITY_TYPE_STK: &str = "01";
pub const SECURITY_TYPE_DEV: &str = "02";

/// Maximum body length the decoder accepts (tag 9).
pub const MSG_BODY_MAX_LEN: usize = 4096;
/// Shortest byte sequence that can hold a complete message.
pub const MSG_MIN_LEN: usize = 50;
/// `10=NNN<SOH>`.
pub const CHECKSUM_FIELD_LEN: usize = 7;
pub const CHECKSUM_LEN: usize = 3;
/// Encode buffer size sufficient for every request this client builds.
pub const MSG_MAX_LEN: usize = 4096;
/// Raw market data carried under tag 96.
pub const MD_DATA_MAX_LEN: usize = 4096;

/// Field tags used by the STEP dialect.
pub mod tags {
    pub const BEGIN_STRING: u32 = 8;
    pub const BODY_LENGTH: u32 = 9;
    pub const CHECKSUM: u32 = 10;
    pub const MSG_SEQ_NUM: u32 = 34;
    pub const MSG_TYPE: u32 = 35;
    pub const POSS_DUP_FLAG: u32 = 43;
    pub const SENDER_COMP_ID: u32 = 49;
    pub const SENDING_TIME: u32 = 52;
    pub const TARGET_COMP_ID: u32 = 56;
    pub const TEXT: u32 = 58;
    pub const TRADE_DATE: u32 = 75;
    pub const RAWDATA_LENGTH: u32 = 95;
    pub const RAWDATA: u32 = 96;
    pub const POSS_RESEND: u32 = 97;
    pub const ENCRYPT_METHOD: u32 = 98;
    pub const HEARTBT_INT: u32 = 108;
    pub const TESTREQ_ID: u32 = 112;
    pub const RESET_SEQNUM_FLAG: u32 = 141;
    pub const SECURITY_TYPE: u32 = 167;
    pub const MD_UPDATETYPE: u32 = 265;
    pub const TRADING_SESSION_ID: u32 = 336;
    pub const TRADE_SES_MODE: u32 = 339;
    pub const MSG_ENCODING: u32 = 347;
    pub const TOTNO_RELATEDSYM: u32 = 393;
    pub const USERNAME: u32 = 553;
    pub const PASSWORD: u32 = 554;
    pub const LAST_UPDATETIME: u32 = 779;
    pub const NEXTEXPECTEDMSG_SEQNUM: u32 = 789;
    pub const DEFAULT_APPLVER_ID: u32 = 1137;
    pub const APPL_ID: u32 = 1180;
    pub const APPL_SEQ_NUM: u32 = 1181;
    pub const DEFAULT_APPLEXT_ID: u32 = 1407;
    pub const DEFAULT_CSTM_APPLVER_ID: u32 = 1408;
    pub const SESSION_STATUS: u32 = 1409;
    pub const MD_COUNT: u32 = 5468;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Heartbeat,
    Logout,
    Logon,
    MdRequest,
    MdSnapshot,
    TradingStatus,
}

impl MsgType {
    /// Tag 35 wire value.
    pub fn wire(self) -> &'static str {
        match self {
            MsgType::Heartbeat => "0",
            MsgType::Logout => "5",
            MsgType::Logon => "A",
            MsgType::MdRequest => "V",
            MsgType::MdSnapshot => "W",
            MsgType::TradingStatus => "h",
        }
    }

    pub fn from_wire(value: &[u8]) -> Option<MsgType> {
        match value {
            b"0" => Some(MsgType::Heartbeat),
            b"5" => Some(MsgType::Logout),
            b"A" => Some(MsgType::Logon),
            b"V" => Some(MsgType::MdRequest),
            b"W" => Some(MsgType::MdSnapshot),
            b"h" => Some(MsgType::TradingStatus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepMessage {
    pub sender_comp_id: String,
    pub target_comp_id: String,
    /// Monotone from 1 within a session; 0 means the field was absent.
    pub msg_seq_num: u64,
    pub poss_dup_flag: Option<char>,
    pub poss_resend: Option<char>,
    pub sending_time: String,
    pub msg_encoding: String,
    pub body: MessageBody,
}

impl StepMessage {
    /// A message with an empty header around the supplied body. The
    /// encoding defaults to the dialect constant.
    pub fn new(body: MessageBody) -> StepMessage {
        StepMessage {
            sender_comp_id: String::new(),
            target_comp_id: String::new(),
            msg_seq_num: 0,
            poss_dup_flag: None,
            poss_resend: None,
            sending_time: String::new(),
            msg_encoding: MSG_ENCODING.to_string(),
            body,
        }
    }

    #[inline]
    pub fn msg_type(&self) -> MsgType {
        self.body.msg_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Heartbeat(HeartbeatRecord),
    Logout(LogoutRecord),
    Logon(LogonRecord),
    MdRequest(MdRequestRecord),
    MdSnapshot(MdSnapshotRecord),
    TradingStatus(TradingStatusRecord),
}

impl MessageBody {
    pub fn msg_type(&self) -> MsgType {
        match self {
            MessageBody::Heartbeat(_) => MsgType::Heartbeat,
            MessageBody::Logout(_) => MsgType::Logout,
            MessageBody::Logon(_) => MsgType::Logon,
            MessageBody::MdRequest(_) => MsgType::MdRequest,
            MessageBody::MdSnapshot(_) => MsgType::MdSnapshot,
            MessageBody::TradingStatus(_) => MsgType::TradingStatus,
        }
    }

    /// An empty record of the given type, ready for the decoder body loop.
    pub fn empty(msg_type: MsgType) -> MessageBody {
        match msg_type {
            MsgType::Heartbeat => MessageBody::Heartbeat(HeartbeatRecord::default()),
            MsgType::Logout => MessageBody::Logout(LogoutRecord::default()),
            MsgType::Logon => MessageBody::Logon(LogonRecord::default()),
            MsgType::MdRequest => MessageBody::MdRequest(MdRequestRecord::default()),
            MsgType::MdSnapshot => MessageBody::MdSnapshot(MdSnapshotRecord::default()),
            MsgType::TradingStatus => MessageBody::TradingStatus(TradingStatusRecord::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatRecord {
    pub test_req_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogoutRecord {
    pub session_status: Option<u16>,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogonRecord {
    pub encrypt_method: Option<u8>,
    pub heart_bt_int: Option<u32>,
    pub reset_seq_num_flag: Option<char>,
    pub next_expected_msg_seq_num: Option<u64>,
    pub username: String,
    pub password: String,
    pub default_appl_ver_id: String,
    pub default_appl_ext_id: Option<u32>,
    pub default_cstm_appl_ver_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MdRequestRecord {
    pub security_type: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MdSnapshotRecord {
    pub security_type: String,
    pub trad_ses_mode: Option<i16>,
    pub appl_id: Option<u32>,
    pub appl_seq_num: Option<u64>,
    pub trade_date: String,
    pub last_update_time: String,
    pub md_update_type: String,
    pub md_count: Option<u32>,
    pub md_data_len: Option<u32>,
    pub md_data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingStatusRecord {
    pub security_type: String,
    pub trad_ses_mode: Option<i16>,
    pub trading_session_id: String,
    pub tot_no_related_sym: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_wire_roundtrip() {
        for &mt in &[
            MsgType::Heartbeat,
            MsgType::Logout,
            MsgType::Logon,
            MsgType::MdRequest,
            MsgType::MdSnapshot,
            MsgType::TradingStatus,
        ] {
            assert_eq!(MsgType::from_wire(mt.wire().as_bytes()), Some(mt));
        }
        assert_eq!(MsgType::from_wire(b"X"), None);
        assert_eq!(MsgType::from_wire(b""), None);
    }

    #[test]
    fn test_new_message_defaults() {
        let msg = StepMessage::new(MessageBody::empty(MsgType::Heartbeat));
        assert_eq!(msg.msg_type(), MsgType::Heartbeat);
        assert_eq!(msg.msg_encoding, "GBK");
        assert_eq!(msg.msg_seq_num, 0);
        assert_eq!(msg.poss_dup_flag, None);
    }
}
