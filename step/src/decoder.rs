//! Message decoding. `decode` either returns one message plus the number
//! of bytes it occupied, or `StepError::Wait` when the buffer holds less
//! than a full message; any other error is fatal for the stream.

use crate::field::{checksum, get_binary_field, get_text_field, Field};
use crate::message::*;
use crate::support::{StepError, StepFault, StepResult};

pub fn decode(buf: &[u8]) -> StepResult<(StepMessage, usize)> {
    if buf.len() < MSG_MIN_LEN {
        return Err(StepError::Wait);
    }

    let mut offset = 0;

    // Field 8 (BeginString).
    let field = get_text_field(buf, &mut offset)?;
    if field.tag != tags::BEGIN_STRING {
        return Err(StepFault::InvalidMsgFormat("the first field tag isn't 8(BeginString)").into());
    }
    if field.value != BEGIN_STRING.as_bytes() {
        return Err(invalid_value(&field, "const value \"FIXT.1.1\"").into());
    }

    // Field 9 (BodyLength).
    let field = get_text_field(buf, &mut offset)?;
    if field.tag != tags::BODY_LENGTH {
        return Err(StepFault::InvalidMsgFormat("the second field tag isn't 9(BodyLength)").into());
    }
    let body_len = field.as_u64()? as usize;
    if body_len > MSG_BODY_MAX_LEN {
        return Err(invalid_value(&field, "BodyLength overflow").into());
    }

    let msg_len = offset + body_len + CHECKSUM_FIELD_LEN;
    if buf.len() < msg_len {
        return Err(StepError::Wait);
    }

    // Field 10 (CheckSum) sits right after the body.
    let mut trailer_offset = offset + body_len;
    let field = get_text_field(buf, &mut trailer_offset)?;
    if field.tag != tags::CHECKSUM {
        return Err(StepFault::InvalidMsgFormat("the last field tag isn't 10(Checksum)").into());
    }
    if field.value.len() != CHECKSUM_LEN {
        return Err(invalid_value(&field, "invalid checksum length").into());
    }
    if !field.is_digits_only() {
        return Err(invalid_value(&field, "invalid number only string value").into());
    }
    let expected = checksum(&buf[..offset + body_len]);
    if field.value != expected.as_bytes() {
        return Err(StepFault::ChecksumFailed {
            got: field.to_text(),
            expected,
        }
        .into());
    }

    let msg = decode_body(&buf[offset..offset + body_len])?;

    Ok((msg, msg_len))
}

/// Field 35 first, then one field at a time into either a header slot or
/// the per-type record. Unknown tags are an error.
fn decode_body(body: &[u8]) -> StepResult<StepMessage> {
    let mut offset = 0;

    let field = get_text_field(body, &mut offset)?;
    if field.tag != tags::MSG_TYPE {
        return Err(StepFault::InvalidMsgFormat("the third field tag isn't 35(MsgType)").into());
    }
    let msg_type =
        MsgType::from_wire(field.value).ok_or_else(|| StepFault::InvalidMsgType(field.to_text()))?;

    let mut msg = StepMessage::new(MessageBody::empty(msg_type));

    while offset < body.len() {
        let field = get_text_field(body, &mut offset)?;
        if apply_header(&mut msg, &field)? {
            continue;
        }

        match &mut msg.body {
            MessageBody::Heartbeat(record) => apply_heartbeat(record, &field)?,
            MessageBody::Logout(record) => apply_logout(record, &field)?,
            MessageBody::Logon(record) => apply_logon(record, &field)?,
            MessageBody::MdRequest(record) => apply_md_request(record, &field)?,
            MessageBody::MdSnapshot(record) => apply_md_snapshot(record, &field, body, &mut offset)?,
            MessageBody::TradingStatus(record) => apply_trading_status(record, &field)?,
        }
    }

    Ok(msg)
}

fn apply_header(msg: &mut StepMessage, field: &Field) -> StepResult<bool> {
    match field.tag {
        tags::SENDER_COMP_ID => msg.sender_comp_id = field.to_text(),
        tags::TARGET_COMP_ID => msg.target_comp_id = field.to_text(),
        tags::MSG_SEQ_NUM => msg.msg_seq_num = field.as_u64()?,
        tags::SENDING_TIME => msg.sending_time = field.to_text(),
        tags::MSG_ENCODING => msg.msg_encoding = field.to_text(),
        tags::POSS_DUP_FLAG => msg.poss_dup_flag = Some(field.as_char()?),
        tags::POSS_RESEND => msg.poss_resend = Some(field.as_char()?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn apply_heartbeat(record: &mut HeartbeatRecord, field: &Field) -> StepResult<()> {
    match field.tag {
        tags::TESTREQ_ID => record.test_req_id = field.to_text(),
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

fn apply_logout(record: &mut LogoutRecord, field: &Field) -> StepResult<()> {
    match field.tag {
        tags::SESSION_STATUS => record.session_status = Some(field.as_u16()?),
        tags::TEXT => record.text = field.to_text(),
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

fn apply_logon(record: &mut LogonRecord, field: &Field) -> StepResult<()> {
    match field.tag {
        tags::ENCRYPT_METHOD => record.encrypt_method = Some(field.as_u8()?),
        tags::HEARTBT_INT => record.heart_bt_int = Some(field.as_u32()?),
        tags::RESET_SEQNUM_FLAG => record.reset_seq_num_flag = Some(field.as_char()?),
        tags::NEXTEXPECTEDMSG_SEQNUM => {
            record.next_expected_msg_seq_num = Some(field.as_u64()?)
        }
        tags::USERNAME => record.username = field.to_text(),
        tags::PASSWORD => record.password = field.to_text(),
        tags::DEFAULT_APPLVER_ID => record.default_appl_ver_id = field.to_text(),
        tags::DEFAULT_APPLEXT_ID => record.default_appl_ext_id = Some(field.as_u32()?),
        tags::DEFAULT_CSTM_APPLVER_ID => record.default_cstm_appl_ver_id = field.to_text(),
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

fn apply_md_request(record: &mut MdRequestRecord, field: &Field) -> StepResult<()> {
    match field.tag {
        tags::SECURITY_TYPE => record.security_type = field.to_text(),
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

fn apply_md_snapshot(
    record: &mut MdSnapshotRecord,
    field: &Field,
    body: &[u8],
    offset: &mut usize,
) -> StepResult<()> {
    match field.tag {
        tags::SECURITY_TYPE => record.security_type = field.to_text(),
        tags::TRADE_SES_MODE => record.trad_ses_mode = Some(field.as_i16()?),
        tags::APPL_ID => record.appl_id = Some(field.as_u32()?),
        tags::APPL_SEQ_NUM => record.appl_seq_num = Some(field.as_u64()?),
        tags::TRADE_DATE => record.trade_date = field.to_text(),
        tags::LAST_UPDATETIME => record.last_update_time = field.to_text(),
        tags::MD_UPDATETYPE => record.md_update_type = field.to_text(),
        tags::MD_COUNT => record.md_count = Some(field.as_u32()?),
        tags::RAWDATA_LENGTH => {
            let data_len = field.as_u32()?;
            if data_len as usize > MD_DATA_MAX_LEN {
                return Err(invalid_value(field, "invalid value length").into());
            }
            record.md_data_len = Some(data_len);

            // Tag 96 (RawData) must immediately follow tag 95; the length
            // just read gates a binary-form field read.
            let raw = get_binary_field(body, data_len as usize, offset)?;
            if raw.tag != tags::RAWDATA {
                return Err(StepFault::InvalidMsgFormat(
                    "tag 96(RawData) must follow tag 95(RawDataLength)",
                )
                .into());
            }
            record.md_data = raw.value.to_vec();
        }
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

fn apply_trading_status(record: &mut TradingStatusRecord, field: &Field) -> StepResult<()> {
    match field.tag {
        tags::SECURITY_TYPE => record.security_type = field.to_text(),
        tags::TRADE_SES_MODE => record.trad_ses_mode = Some(field.as_i16()?),
        tags::TRADING_SESSION_ID => record.trading_session_id = field.to_text(),
        tags::TOTNO_RELATEDSYM => record.tot_no_related_sym = Some(field.as_u32()?),
        tag => return Err(StepFault::UnexpectedTag(tag).into()),
    }
    Ok(())
}

#[inline]
fn invalid_value(field: &Field, reason: &'static str) -> StepFault {
    StepFault::InvalidFieldValue {
        tag: field.tag,
        value: field.to_text(),
        reason,
    }
}
