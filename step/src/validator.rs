//! Semantic validation, run after decode on the receive path and before
//! encode on the send path. The decoder only guarantees structure; this
//! module enforces per-type field presence and the dialect's constant
//! values.

use crate::message::*;
use crate::support::{StepFault, StepResult};

/// Transmission direction of the message being validated. A handful of
/// logon rules apply to requests only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

pub fn validate(msg: &StepMessage, direction: Direction) -> StepResult<()> {
    validate_header(msg)?;

    match &msg.body {
        MessageBody::Heartbeat(_) => Ok(()),
        MessageBody::Logout(_) => Ok(()),
        MessageBody::Logon(record) => validate_logon(record, direction),
        MessageBody::MdRequest(record) => validate_md_request(record),
        MessageBody::MdSnapshot(record) => validate_md_snapshot(record),
        MessageBody::TradingStatus(record) => validate_trading_status(record),
    }
}

fn validate_header(msg: &StepMessage) -> StepResult<()> {
    if msg.sender_comp_id.is_empty() {
        return Err(StepFault::FieldNotFound("49, SenderCompID").into());
    }
    if msg.target_comp_id.is_empty() {
        return Err(StepFault::FieldNotFound("56, TargetCompID").into());
    }
    if msg.msg_seq_num == 0 {
        return Err(StepFault::FieldNotFound("34, MsgSeqNum").into());
    }
    if msg.sending_time.is_empty() {
        return Err(StepFault::FieldNotFound("52, SendingTime").into());
    }
    if msg.msg_encoding.is_empty() {
        return Err(StepFault::FieldNotFound("347, MsgEncoding").into());
    }
    if msg.msg_encoding != MSG_ENCODING {
        return Err(StepFault::InvalidFieldValue {
            tag: tags::MSG_ENCODING,
            value: msg.msg_encoding.clone(),
            reason: "const value \"GBK\"",
        }
        .into());
    }
    Ok(())
}

fn validate_logon(record: &LogonRecord, direction: Direction) -> StepResult<()> {
    if record.encrypt_method.is_none() {
        return Err(StepFault::FieldNotFound("98, EncryptMethod").into());
    }
    if record.heart_bt_int.is_none() {
        return Err(StepFault::FieldNotFound("108, HeartBtInt").into());
    }
    if record.username.is_empty() {
        return Err(StepFault::FieldNotFound("553, Username").into());
    }

    if direction == Direction::Request {
        match record.reset_seq_num_flag {
            None => return Err(StepFault::FieldNotFound("141, ResetSeqNumFlag").into()),
            Some('Y') => (),
            Some(flag) => {
                return Err(StepFault::InvalidFieldValue {
                    tag: tags::RESET_SEQNUM_FLAG,
                    value: flag.to_string(),
                    reason: "const value \"Y\"",
                }
                .into())
            }
        }
        if record.next_expected_msg_seq_num.is_none() {
            return Err(StepFault::FieldNotFound("789, NextExpectedMsgSeqNum").into());
        }
        if record.password.is_empty() {
            return Err(StepFault::FieldNotFound("554, Password").into());
        }
        if record.default_appl_ver_id.is_empty() {
            return Err(StepFault::FieldNotFound("1137, DefaultApplVerID").into());
        }
        if record.default_appl_ver_id != DEFAULT_APPLVER_ID {
            return Err(StepFault::InvalidFieldValue {
                tag: tags::DEFAULT_APPLVER_ID,
                value: record.default_appl_ver_id.clone(),
                reason: "const value \"9\"",
            }
            .into());
        }
    }

    Ok(())
}

fn validate_md_request(record: &MdRequestRecord) -> StepResult<()> {
    if record.security_type.is_empty() {
        return Err(StepFault::FieldNotFound("167, SecurityType").into());
    }
    Ok(())
}

fn validate_md_snapshot(record: &MdSnapshotRecord) -> StepResult<()> {
    if record.security_type.is_empty() {
        return Err(StepFault::FieldNotFound("167, SecurityType").into());
    }
    if record.trad_ses_mode.is_none() {
        return Err(StepFault::FieldNotFound("339, TradSesMode").into());
    }
    if record.appl_id.is_none() {
        return Err(StepFault::FieldNotFound("1180, ApplID").into());
    }
    if record.appl_seq_num.is_none() {
        return Err(StepFault::FieldNotFound("1181, ApplSeqNum").into());
    }
    if record.trade_date.is_empty() {
        return Err(StepFault::FieldNotFound("75, TradeDate").into());
    }
    if record.md_update_type.is_empty() {
        return Err(StepFault::FieldNotFound("265, MDUpdateType").into());
    }
    if record.md_count.is_none() {
        return Err(StepFault::FieldNotFound("5468, MDCount").into());
    }
    if record.md_data_len.is_none() {
        return Err(StepFault::FieldNotFound("95, RawDataLength").into());
    }
    Ok(())
}

fn validate_trading_status(record: &TradingStatusRecord) -> StepResult<()> {
    if record.security_type.is_empty() {
        return Err(StepFault::FieldNotFound("167, SecurityType").into());
    }
    if record.trad_ses_mode.is_none() {
        return Err(StepFault::FieldNotFound("339, TradSesMode").into());
    }
    if record.trading_session_id.is_empty() {
        return Err(StepFault::FieldNotFound("336, TradingSessionID").into());
    }
    if record.tot_no_related_sym.is_none() {
        return Err(StepFault::FieldNotFound("393, TotNoRelatedSym").into());
    }
    Ok(())
}
