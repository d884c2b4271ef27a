//! Session drivers: the translation between wire messages and user
//! callbacks. Handlers mutate driver state under the driver lock and
//! return `Notice`s; the channel worker dispatches them to the SPI after
//! the lock is released, so callbacks stay totally ordered (one emitting
//! thread) without holding any lock into user code.

pub mod tcp;
pub mod udp;

use crate::spi::{ClientSpi, EventKind, MktData, MktStatus, MktType};
use crate::support::*;
use chrono::Local;
use std::sync::Arc;

use step::message::*;
use step::validator::{validate, Direction};
use step::{encode, MessageBody, StepMessage};

/// One pending user notification.
#[derive(Debug)]
pub(crate) enum Notice {
    Connected,
    Disconnected { code: u32, reason: String },
    LoginRsp { heartbeat_intl: u16, code: u32, reason: String },
    LogoutRsp { code: u32, reason: String },
    MktDataSubRsp { mkt_type: MktType, code: u32, reason: String },
    MktDataArrived(MktData),
    MktStatusChanged(MktStatus),
    Event { kind: EventKind, code: u32, text: String },
}

pub(crate) fn dispatch(spi: &Arc<dyn ClientSpi>, hid: u32, notices: Vec<Notice>) {
    for notice in notices {
        match notice {
            Notice::Connected => spi.on_connected(hid),
            Notice::Disconnected { code, reason } => spi.on_disconnected(hid, code, &reason),
            Notice::LoginRsp {
                heartbeat_intl,
                code,
                reason,
            } => spi.on_login_rsp(hid, heartbeat_intl, code, &reason),
            Notice::LogoutRsp { code, reason } => spi.on_logout_rsp(hid, code, &reason),
            Notice::MktDataSubRsp {
                mkt_type,
                code,
                reason,
            } => spi.on_mkt_data_sub_rsp(hid, mkt_type, code, &reason),
            Notice::MktDataArrived(data) => spi.on_mkt_data_arrived(hid, &data),
            Notice::MktStatusChanged(status) => spi.on_mkt_status_changed(hid, &status),
            Notice::Event { kind, code, text } => spi.on_event_occurred(hid, kind, code, &text),
        }
    }
}

pub(crate) fn warning(error: &EpsError) -> Notice {
    Notice::Event {
        kind: EventKind::Warning,
        code: error.code(),
        text: error.to_string(),
    }
}

pub(crate) fn failure(error: &EpsError) -> Notice {
    Notice::Event {
        kind: EventKind::Error,
        code: error.code(),
        text: error.to_string(),
    }
}

/// Wire SendingTime for an outbound message.
fn sending_time() -> String {
    Local::now().format("%Y%m%d-%H:%M:%S").to_string()
}

fn fill_header(msg: &mut StepMessage, msg_seq_num: u64) {
    msg.sender_comp_id = SENDER_COMP_ID.to_string();
    msg.target_comp_id = TARGET_COMP_ID.to_string();
    msg.msg_seq_num = msg_seq_num;
    msg.sending_time = sending_time();
}

fn finish_request(msg: &StepMessage) -> EpsResult<Vec<u8>> {
    validate(msg, Direction::Request)?;

    let mut buf = [0u8; MSG_MAX_LEN];
    let size = encode(msg, &mut buf)?;
    Ok(buf[..size].to_vec())
}

pub(crate) fn build_logon(
    msg_seq_num: u64,
    username: &str,
    password: &str,
    heartbeat_intl: u16,
) -> EpsResult<Vec<u8>> {
    let mut msg = StepMessage::new(MessageBody::Logon(LogonRecord {
        encrypt_method: Some(0),
        heart_bt_int: Some(u32::from(heartbeat_intl)),
        reset_seq_num_flag: Some('Y'),
        next_expected_msg_seq_num: Some(1),
        username: username.to_string(),
        password: password.to_string(),
        default_appl_ver_id: DEFAULT_APPLVER_ID.to_string(),
        default_appl_ext_id: Some(DEFAULT_APPLEXT_ID),
        default_cstm_appl_ver_id: String::new(),
    }));
    fill_header(&mut msg, msg_seq_num);
    finish_request(&msg)
}

pub(crate) fn build_logout(msg_seq_num: u64, reason: &str) -> EpsResult<Vec<u8>> {
    let mut msg = StepMessage::new(MessageBody::Logout(LogoutRecord {
        session_status: None,
        text: reason.to_string(),
    }));
    fill_header(&mut msg, msg_seq_num);
    finish_request(&msg)
}

pub(crate) fn build_md_request(msg_seq_num: u64, mkt_type: MktType) -> EpsResult<Vec<u8>> {
    let mut msg = StepMessage::new(MessageBody::MdRequest(MdRequestRecord {
        security_type: mkt_type.code().to_string(),
    }));
    fill_header(&mut msg, msg_seq_num);
    finish_request(&msg)
}

pub(crate) fn build_heartbeat(msg_seq_num: u64) -> EpsResult<Vec<u8>> {
    let mut msg = StepMessage::new(MessageBody::Heartbeat(HeartbeatRecord::default()));
    fill_header(&mut msg, msg_seq_num);
    finish_request(&msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use step::decode;

    fn decoded(wire: &[u8]) -> StepMessage {
        let (msg, consumed) = decode(wire).unwrap();
        assert_eq!(consumed, wire.len());
        msg
    }

    #[test]
    fn test_build_logon() {
        let wire = build_logon(1, "u001", "secret", 30).unwrap();
        let msg = decoded(&wire);

        assert_eq!(msg.msg_seq_num, 1);
        assert_eq!(msg.sender_comp_id, SENDER_COMP_ID);
        assert_eq!(msg.target_comp_id, TARGET_COMP_ID);
        assert_eq!(msg.msg_encoding, MSG_ENCODING);

        match msg.body {
            MessageBody::Logon(record) => {
                assert_eq!(record.encrypt_method, Some(0));
                assert_eq!(record.heart_bt_int, Some(30));
                assert_eq!(record.reset_seq_num_flag, Some('Y'));
                assert_eq!(record.next_expected_msg_seq_num, Some(1));
                assert_eq!(record.username, "u001");
                assert_eq!(record.password, "secret");
                assert_eq!(record.default_appl_ver_id, "9");
                assert_eq!(record.default_appl_ext_id, Some(DEFAULT_APPLEXT_ID));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_build_md_request_codes() {
        for (mkt, code) in [
            (MktType::All, "00"),
            (MktType::Stk, "01"),
            (MktType::Dev, "02"),
        ]
        .iter()
        {
            let wire = build_md_request(3, *mkt).unwrap();
            match decoded(&wire).body {
                MessageBody::MdRequest(record) => assert_eq!(record.security_type, *code),
                other => panic!("unexpected body {:?}", other),
            }
        }
    }

    #[test]
    fn test_build_heartbeat_and_logout() {
        let wire = build_heartbeat(9).unwrap();
        let msg = decoded(&wire);
        assert_eq!(msg.msg_seq_num, 9);
        assert_eq!(msg.msg_type(), step::MsgType::Heartbeat);

        let wire = build_logout(10, "done for today").unwrap();
        match decoded(&wire).body {
            MessageBody::Logout(record) => assert_eq!(record.text, "done for today"),
            other => panic!("unexpected body {:?}", other),
        }
    }
}
