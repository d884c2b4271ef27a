//! Message encoding. The body is rendered into a scratch buffer first so
//! that tag 9 (BodyLength) is known before the header is written, then
//! the checksum trailer is computed over everything preceding it.

use crate::field::{
    checksum, put_bytes_field, put_char_field, put_int_field, put_str_field, put_uint_field,
};
use crate::message::*;
use crate::support::{StepFault, StepResult};
use std::io::Cursor;

/// Encodes `msg` into `buf`, returning the number of bytes written.
pub fn encode(msg: &StepMessage, buf: &mut [u8]) -> StepResult<usize> {
    let mut body = [0u8; MSG_BODY_MAX_LEN * 2];
    let body_size = {
        let mut stream = Cursor::new(&mut body[..]);
        encode_body(msg, &mut stream)?;
        stream.position() as usize
    };

    let header_size = {
        let mut stream = Cursor::new(&mut buf[..]);
        put_str_field(&mut stream, tags::BEGIN_STRING, BEGIN_STRING)?;
        put_uint_field(&mut stream, tags::BODY_LENGTH, body_size as u64)?;
        stream.position() as usize
    };

    // Room for the body and the fixed-size checksum trailer.
    if header_size + body_size + CHECKSUM_FIELD_LEN > buf.len() {
        return Err(StepFault::BufferOverflow.into());
    }
    buf[header_size..header_size + body_size].copy_from_slice(&body[..body_size]);

    let trailer_at = header_size + body_size;
    let sum = checksum(&buf[..trailer_at]);

    let trailer_size = {
        let mut stream = Cursor::new(&mut buf[trailer_at..]);
        put_str_field(&mut stream, tags::CHECKSUM, &sum)?;
        stream.position() as usize
    };

    Ok(trailer_at + trailer_size)
}

/// Header fields in canonical order (35, 49, 56, 34, 43?, 97?, 52, 347),
/// then the per-type record.
fn encode_body(msg: &StepMessage, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    put_str_field(stream, tags::MSG_TYPE, msg.msg_type().wire())?;
    if !msg.sender_comp_id.is_empty() {
        put_str_field(stream, tags::SENDER_COMP_ID, &msg.sender_comp_id)?;
    }
    if !msg.target_comp_id.is_empty() {
        put_str_field(stream, tags::TARGET_COMP_ID, &msg.target_comp_id)?;
    }
    put_uint_field(stream, tags::MSG_SEQ_NUM, msg.msg_seq_num)?;
    if let Some(flag) = msg.poss_dup_flag {
        put_char_field(stream, tags::POSS_DUP_FLAG, flag)?;
    }
    if let Some(flag) = msg.poss_resend {
        put_char_field(stream, tags::POSS_RESEND, flag)?;
    }
    if !msg.sending_time.is_empty() {
        put_str_field(stream, tags::SENDING_TIME, &msg.sending_time)?;
    }
    if !msg.msg_encoding.is_empty() {
        put_str_field(stream, tags::MSG_ENCODING, &msg.msg_encoding)?;
    }

    match &msg.body {
        MessageBody::Heartbeat(record) => encode_heartbeat(record, stream),
        MessageBody::Logout(record) => encode_logout(record, stream),
        MessageBody::Logon(record) => encode_logon(record, stream),
        MessageBody::MdRequest(record) => encode_md_request(record, stream),
        MessageBody::MdSnapshot(record) => encode_md_snapshot(record, stream),
        MessageBody::TradingStatus(record) => encode_trading_status(record, stream),
    }
}

fn encode_heartbeat(record: &HeartbeatRecord, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    if !record.test_req_id.is_empty() {
        put_str_field(stream, tags::TESTREQ_ID, &record.test_req_id)?;
    }
    Ok(())
}

fn encode_logout(record: &LogoutRecord, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    if let Some(status) = record.session_status {
        put_uint_field(stream, tags::SESSION_STATUS, u64::from(status))?;
    }
    if !record.text.is_empty() {
        put_str_field(stream, tags::TEXT, &record.text)?;
    }
    Ok(())
}

fn encode_logon(record: &LogonRecord, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    if let Some(method) = record.encrypt_method {
        put_uint_field(stream, tags::ENCRYPT_METHOD, u64::from(method))?;
    }
    if let Some(interval) = record.heart_bt_int {
        put_uint_field(stream, tags::HEARTBT_INT, u64::from(interval))?;
    }
    if let Some(flag) = record.reset_seq_num_flag {
        put_char_field(stream, tags::RESET_SEQNUM_FLAG, flag)?;
    }
    if let Some(next) = record.next_expected_msg_seq_num {
        put_uint_field(stream, tags::NEXTEXPECTEDMSG_SEQNUM, next)?;
    }
    if !record.username.is_empty() {
        put_str_field(stream, tags::USERNAME, &record.username)?;
    }
    if !record.password.is_empty() {
        put_str_field(stream, tags::PASSWORD, &record.password)?;
    }
    if !record.default_appl_ver_id.is_empty() {
        put_str_field(stream, tags::DEFAULT_APPLVER_ID, &record.default_appl_ver_id)?;
    }
    if let Some(ext) = record.default_appl_ext_id {
        put_uint_field(stream, tags::DEFAULT_APPLEXT_ID, u64::from(ext))?;
    }
    if !record.default_cstm_appl_ver_id.is_empty() {
        put_str_field(
            stream,
            tags::DEFAULT_CSTM_APPLVER_ID,
            &record.default_cstm_appl_ver_id,
        )?;
    }
    Ok(())
}

fn encode_md_request(record: &MdRequestRecord, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    put_str_field(stream, tags::SECURITY_TYPE, &record.security_type)
}

fn encode_md_snapshot(record: &MdSnapshotRecord, stream: &mut Cursor<&mut [u8]>) -> StepResult<()> {
    put_str_field(stream, tags::SECURITY_TYPE, &record.security_type)?;
    if let Some(mode) = record.trad_ses_mode {
        put_int_field(stream, tags::TRADE_SES_MODE, i64::from(mode))?;
    }
    if let Some(appl_id) = record.appl_id {
        put_uint_field(stream, tags::APPL_ID, u64::from(appl_id))?;
    }
    if let Some(seq) = record.appl_seq_num {
        put_uint_field(stream, tags::APPL_SEQ_NUM, seq)?;
    }
    if !record.trade_date.is_empty() {
        put_str_field(stream, tags::TRADE_DATE, &record.trade_date)?;
    }
    if !record.last_update_time.is_empty() {
        put_str_field(stream, tags::LAST_UPDATETIME, &record.last_update_time)?;
    }
    if !record.md_update_type.is_empty() {
        put_str_field(stream, tags::MD_UPDATETYPE, &record.md_update_type)?;
    }
    if let Some(count) = record.md_count {
        put_uint_field(stream, tags::MD_COUNT, u64::from(count))?;
    }
    put_uint_field(stream, tags::RAWDATA_LENGTH, record.md_data.len() as u64)?;
    put_bytes_field(stream, tags::RAWDATA, &record.md_data)
}

fn encode_trading_status(
    record: &TradingStatusRecord,
    stream: &mut Cursor<&mut [u8]>,
) -> StepResult<()> {
    put_str_field(stream, tags::SECURITY_TYPE, &record.security_type)?;
    if let Some(mode) = record.trad_ses_mode {
        put_int_field(stream, tags::TRADE_SES_MODE, i64::from(mode))?;
    }
    if !record.trading_session_id.is_empty() {
        put_str_field(stream, tags::TRADING_SESSION_ID, &record.trading_session_id)?;
    }
    if let Some(count) = record.tot_no_related_sym {
        put_uint_field(stream, tags::TOTNO_RELATEDSYM, u64::from(count))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SOH;
    use crate::support::StepError;

    fn logon_request() -> StepMessage {
        let mut msg = StepMessage::new(MessageBody::Logon(LogonRecord {
            encrypt_method: Some(0),
            heart_bt_int: Some(30),
            reset_seq_num_flag: Some('Y'),
            next_expected_msg_seq_num: Some(1),
            username: "u".to_string(),
            password: "p".to_string(),
            default_appl_ver_id: DEFAULT_APPLVER_ID.to_string(),
            default_appl_ext_id: None,
            default_cstm_appl_ver_id: String::new(),
        }));
        msg.sender_comp_id = SENDER_COMP_ID.to_string();
        msg.target_comp_id = TARGET_COMP_ID.to_string();
        msg.msg_seq_num = 1;
        msg.sending_time = "20140815-09:30:00".to_string();
        msg
    }

    #[test]
    fn test_encode_logon_framing() {
        let mut buf = [0u8; MSG_MAX_LEN];
        let size = encode(&logon_request(), &mut buf).unwrap();
        let wire = &buf[..size];

        assert!(wire.starts_with(b"8=FIXT.1.1\x019="));
        assert_eq!(wire[size - 1], SOH);
        assert_eq!(&wire[size - 7..size - 4], b"10=");

        // Checksum over everything before the trailer field.
        let expected = checksum(&wire[..size - 7]);
        assert_eq!(&wire[size - 4..size - 1], expected.as_bytes());
    }

    #[test]
    fn test_encode_logon_body_length() {
        let mut buf = [0u8; MSG_MAX_LEN];
        let size = encode(&logon_request(), &mut buf).unwrap();
        let wire = &buf[..size];

        // Tag 9 value equals the byte count between its SOH and "10=".
        let header_end = wire
            .iter()
            .enumerate()
            .filter(|(_, &b)| b == SOH)
            .nth(1)
            .map(|(i, _)| i + 1)
            .unwrap();
        let text = std::str::from_utf8(&wire[..header_end - 1]).unwrap();
        let body_len: usize = text.rsplit("9=").next().unwrap().parse().unwrap();
        assert_eq!(header_end + body_len, size - CHECKSUM_FIELD_LEN);
    }

    #[test]
    fn test_encode_field_order() {
        let mut buf = [0u8; MSG_MAX_LEN];
        let size = encode(&logon_request(), &mut buf).unwrap();
        let wire = &buf[..size];

        let order: Vec<String> = wire
            .split(|&b| b == SOH)
            .filter(|span| !span.is_empty())
            .map(|span| {
                let eq = span.iter().position(|&b| b == b'=').unwrap();
                String::from_utf8_lossy(&span[..eq]).into_owned()
            })
            .collect();
        assert_eq!(
            order,
            vec![
                "8", "9", "35", "49", "56", "34", "52", "347", "98", "108", "141", "789", "553",
                "554", "1137", "10"
            ]
        );
    }

    #[test]
    fn test_encode_overflow() {
        let mut buf = [0u8; 32];
        let result = encode(&logon_request(), &mut buf);
        assert_eq!(result.unwrap_err(), StepError::Fatal(StepFault::BufferOverflow));
    }

    #[test]
    fn test_encode_snapshot_raw_data() {
        let mut msg = StepMessage::new(MessageBody::MdSnapshot(MdSnapshotRecord {
            security_type: SECURITY_TYPE_STK.to_string(),
            trad_ses_mode: Some(3),
            appl_id: Some(100),
            appl_seq_num: Some(10),
            trade_date: "20140815".to_string(),
            last_update_time: String::new(),
            md_update_type: "XTP".to_string(),
            md_count: Some(1),
            md_data_len: Some(4),
            md_data: vec![1, 2, 3, 4],
        }));
        msg.sender_comp_id = SENDER_COMP_ID.to_string();
        msg.target_comp_id = TARGET_COMP_ID.to_string();
        msg.msg_seq_num = 7;
        msg.sending_time = "20140815-10:00:00".to_string();

        let mut buf = [0u8; MSG_MAX_LEN];
        let size = encode(&msg, &mut buf).unwrap();
        let wire = &buf[..size];

        // 96 carries the raw bytes, terminated by SOH, right after 95.
        let needle = b"95=4\x0196=\x01\x02\x03\x04\x01";
        assert!(wire
            .windows(needle.len())
            .any(|window| window == &needle[..]));
    }
}
