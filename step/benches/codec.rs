use criterion::{criterion_group, criterion_main, Criterion};
use step::message::*;
use step::{decode, encode};

fn snapshot() -> StepMessage {
    let mut msg = StepMessage::new(MessageBody::MdSnapshot(MdSnapshotRecord {
        security_type: SECURITY_TYPE_STK.to_string(),
        trad_ses_mode: Some(3),
        appl_id: Some(100),
        appl_seq_num: Some(987654321),
        trade_date: "20140815".to_string(),
        last_update_time: "09300000".to_string(),
        md_update_type: "XTP".to_string(),
        md_count: Some(64),
        md_data_len: Some(1024),
        md_data: vec![0x5a; 1024],
    }));
    msg.sender_comp_id = SENDER_COMP_ID.to_string();
    msg.target_comp_id = TARGET_COMP_ID.to_string();
    msg.msg_seq_num = 123456;
    msg.sending_time = "20140815-09:30:00".to_string();
    msg
}

fn bench_encode(c: &mut Criterion) {
    let msg = snapshot();
    let mut buf = [0u8; MSG_MAX_LEN];
    c.bench_function("encode_snapshot", |b| {
        b.iter(|| encode(&msg, &mut buf).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let msg = snapshot();
    let mut buf = [0u8; MSG_MAX_LEN];
    let size = encode(&msg, &mut buf).unwrap();
    let wire = &buf[..size];
    c.bench_function("decode_snapshot", |b| b.iter(|| decode(wire).unwrap()));
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
