//! Market database: the acceptance engine deciding whether an incoming
//! snapshot or status message is delivered, dropped, or flagged. Owned by
//! one driver and only touched from its worker thread (API calls take
//! the driver lock first).

use crate::spi::{snapshot_mkt_type, status_mkt_type, MktData, MktStatus, MktType, TrdSesMode};
use crate::support::{EpsError, EpsResult};
use step::message::{MdSnapshotRecord, TradingStatusRecord};
use step::{MessageBody, StepFault, StepMessage};

/// Fate of a snapshot that passed structural checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotVerdict {
    /// Deliver.
    Accept,
    /// Deliver, and warn that the publisher identity changed.
    SourceChanged,
    /// Drop silently: market not subscribed.
    Unsubscribed,
    /// Drop silently: sequence number did not advance.
    Backflow,
}

/// Fate of a trading-status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    Accept,
    Unsubscribed,
    /// Drop: phase code equals the stored one.
    Unchanged,
}

pub struct MktDatabase {
    subscribed: [bool; MktType::COUNT],
    last_appl_seq_num: [u64; MktType::COUNT],
    last_status: [String; MktType::COUNT],
    /// Current publisher identity, zero until one is observed.
    appl_id: u32,
}

impl MktDatabase {
    pub fn new() -> MktDatabase {
        MktDatabase {
            subscribed: [false; MktType::COUNT],
            last_appl_seq_num: [0; MktType::COUNT],
            last_status: Default::default(),
            appl_id: 0,
        }
    }

    /// Marks a market (or every market, for `All`) subscribed. Fails with
    /// `MktTypeDupSubscribed` only when nothing new was marked.
    pub fn subscribe(&mut self, mkt_type: MktType) -> EpsResult<()> {
        match mkt_type.index() {
            None => {
                let mut already_all = true;
                for mkt in MktType::concrete().iter() {
                    let slot = mkt.index().expect("concrete market must have a slot");
                    if !self.subscribed[slot] {
                        self.subscribed[slot] = true;
                        already_all = false;
                    }
                }
                if already_all {
                    return Err(EpsError::MktTypeDupSubscribed);
                }
                Ok(())
            }
            Some(slot) => {
                if self.subscribed[slot] {
                    return Err(EpsError::MktTypeDupSubscribed);
                }
                self.subscribed[slot] = true;
                Ok(())
            }
        }
    }

    /// Clears every subscription flag. Sequence state is kept so a
    /// re-subscribe after reconnect still rejects the same backflow.
    pub fn unsubscribe_all(&mut self) {
        self.subscribed = [false; MktType::COUNT];
    }

    pub fn is_subscribed(&self, mkt_type: MktType) -> bool {
        mkt_type
            .index()
            .map(|slot| self.subscribed[slot])
            .unwrap_or(false)
    }

    /// Acceptance decision for one snapshot record.
    pub fn accept_snapshot(&mut self, record: &MdSnapshotRecord) -> EpsResult<SnapshotVerdict> {
        let mkt_type = snapshot_mkt_type(record)?;
        let slot = mkt_type.index().expect("concrete market must have a slot");

        if !self.subscribed[slot] {
            return Ok(SnapshotVerdict::Unsubscribed);
        }

        let appl_id = record
            .appl_id
            .ok_or(EpsError::from(StepFault::FieldNotFound("1180, ApplID")))?;
        let appl_seq_num = record
            .appl_seq_num
            .ok_or(EpsError::from(StepFault::FieldNotFound("1181, ApplSeqNum")))?;

        if appl_id == self.appl_id {
            if appl_seq_num > self.last_appl_seq_num[slot] {
                self.last_appl_seq_num[slot] = appl_seq_num;
                Ok(SnapshotVerdict::Accept)
            } else {
                Ok(SnapshotVerdict::Backflow)
            }
        } else {
            let prior = self.appl_id;
            self.appl_id = appl_id;
            // A new publisher starts its own sequence space everywhere.
            self.last_appl_seq_num = [0; MktType::COUNT];
            self.last_appl_seq_num[slot] = appl_seq_num;

            if prior != 0 {
                Ok(SnapshotVerdict::SourceChanged)
            } else {
                Ok(SnapshotVerdict::Accept)
            }
        }
    }

    /// Acceptance decision for one trading-status record.
    pub fn accept_status(&mut self, record: &TradingStatusRecord) -> EpsResult<StatusVerdict> {
        let mkt_type = status_mkt_type(record)?;
        let slot = mkt_type.index().expect("concrete market must have a slot");

        if !self.subscribed[slot] {
            return Ok(StatusVerdict::Unsubscribed);
        }

        if self.last_status[slot] == record.trading_session_id {
            return Ok(StatusVerdict::Unchanged);
        }

        self.last_status[slot] = record.trading_session_id.clone();
        Ok(StatusVerdict::Accept)
    }

    #[cfg(test)]
    pub(crate) fn last_appl_seq_num(&self, mkt_type: MktType) -> u64 {
        self.last_appl_seq_num[mkt_type.index().expect("concrete market")]
    }
}

/// Converts a decoded snapshot message into the user-facing structure.
pub fn convert_mkt_data(msg: &StepMessage) -> EpsResult<MktData> {
    let record = match &msg.body {
        MessageBody::MdSnapshot(record) => record,
        other => {
            return Err(EpsError::UnexpectedMsgType(
                other.msg_type().wire().to_string(),
            ))
        }
    };

    Ok(MktData {
        mkt_time: msg.sending_time.chars().take(8).collect(),
        mkt_type: snapshot_mkt_type(record)?,
        trad_ses_mode: TrdSesMode::from_wire(
            record
                .trad_ses_mode
                .ok_or(EpsError::from(StepFault::FieldNotFound("339, TradSesMode")))?,
        )?,
        appl_id: record
            .appl_id
            .ok_or(EpsError::from(StepFault::FieldNotFound("1180, ApplID")))?,
        appl_seq_num: record
            .appl_seq_num
            .ok_or(EpsError::from(StepFault::FieldNotFound("1181, ApplSeqNum")))?,
        trade_date: record.trade_date.clone(),
        md_update_type: record.md_update_type.clone(),
        md_count: record
            .md_count
            .ok_or(EpsError::from(StepFault::FieldNotFound("5468, MDCount")))?,
        md_data: record.md_data.clone(),
    })
}

/// Converts a decoded trading-status message into the user-facing
/// structure.
pub fn convert_mkt_status(msg: &StepMessage) -> EpsResult<MktStatus> {
    let record = match &msg.body {
        MessageBody::TradingStatus(record) => record,
        other => {
            return Err(EpsError::UnexpectedMsgType(
                other.msg_type().wire().to_string(),
            ))
        }
    };

    Ok(MktStatus {
        mkt_type: status_mkt_type(record)?,
        trad_ses_mode: TrdSesMode::from_wire(
            record
                .trad_ses_mode
                .ok_or(EpsError::from(StepFault::FieldNotFound("339, TradSesMode")))?,
        )?,
        mkt_status: record.trading_session_id.clone(),
        tot_no_related_sym: record
            .tot_no_related_sym
            .ok_or_else(|| EpsError::from(StepFault::FieldNotFound("393, TotNoRelatedSym")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(security_type: &str, appl_id: u32, appl_seq_num: u64) -> MdSnapshotRecord {
        MdSnapshotRecord {
            security_type: security_type.to_string(),
            trad_ses_mode: Some(3),
            appl_id: Some(appl_id),
            appl_seq_num: Some(appl_seq_num),
            trade_date: "20140815".to_string(),
            last_update_time: String::new(),
            md_update_type: "XTP".to_string(),
            md_count: Some(1),
            md_data_len: Some(0),
            md_data: Vec::new(),
        }
    }

    fn status(security_type: &str, session_id: &str) -> TradingStatusRecord {
        TradingStatusRecord {
            security_type: security_type.to_string(),
            trad_ses_mode: Some(3),
            trading_session_id: session_id.to_string(),
            tot_no_related_sym: Some(100),
        }
    }

    #[test]
    fn test_subscribe_single_and_duplicate() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();
        assert!(db.is_subscribed(MktType::Stk));
        assert!(!db.is_subscribed(MktType::Dev));

        assert_eq!(
            db.subscribe(MktType::Stk).unwrap_err(),
            EpsError::MktTypeDupSubscribed
        );
    }

    #[test]
    fn test_subscribe_all_fills_remaining() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();

        // Dev was still free, so All succeeds.
        db.subscribe(MktType::All).unwrap();
        assert!(db.is_subscribed(MktType::Dev));

        // Now everything is taken.
        assert_eq!(
            db.subscribe(MktType::All).unwrap_err(),
            EpsError::MktTypeDupSubscribed
        );
    }

    #[test]
    fn test_accept_rejects_all_market() {
        let mut db = MktDatabase::new();
        assert_eq!(
            db.accept_snapshot(&snapshot("00", 1, 1)).unwrap_err(),
            EpsError::InvalidMktType
        );
        assert_eq!(
            db.accept_snapshot(&snapshot("07", 1, 1)).unwrap_err(),
            EpsError::InvalidMktType
        );
    }

    #[test]
    fn test_unsubscribed_dropped() {
        let mut db = MktDatabase::new();
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 1)).unwrap(),
            SnapshotVerdict::Unsubscribed
        );
    }

    #[test]
    fn test_backflow_dropped() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();

        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 10)).unwrap(),
            SnapshotVerdict::Accept
        );

        // Same sequence again: backflow.
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 10)).unwrap(),
            SnapshotVerdict::Backflow
        );
        // Lower: still backflow.
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 9)).unwrap(),
            SnapshotVerdict::Backflow
        );
        // Strictly increasing: accepted.
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 11)).unwrap(),
            SnapshotVerdict::Accept
        );
    }

    #[test]
    fn test_publisher_change_resets_sequences() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::All).unwrap();

        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 10)).unwrap(),
            SnapshotVerdict::Accept
        );
        assert_eq!(
            db.accept_snapshot(&snapshot("02", 100, 50)).unwrap(),
            SnapshotVerdict::Accept
        );

        // New publisher: flagged once, sequence space restarts.
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 200, 1)).unwrap(),
            SnapshotVerdict::SourceChanged
        );
        assert_eq!(db.last_appl_seq_num(MktType::Stk), 1);
        assert_eq!(db.last_appl_seq_num(MktType::Dev), 0);

        // Follow-ups from the new publisher are ordinary accepts.
        assert_eq!(
            db.accept_snapshot(&snapshot("02", 200, 1)).unwrap(),
            SnapshotVerdict::Accept
        );
    }

    #[test]
    fn test_first_publisher_is_silent() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();
        // No prior appl_id, so no source-changed warning.
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 1)).unwrap(),
            SnapshotVerdict::Accept
        );
    }

    #[test]
    fn test_unsubscribe_all_keeps_sequences() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();
        db.accept_snapshot(&snapshot("01", 100, 10)).unwrap();

        db.unsubscribe_all();
        assert!(!db.is_subscribed(MktType::Stk));

        // Re-subscribe: the old sequence still rejects the replay.
        db.subscribe(MktType::Stk).unwrap();
        assert_eq!(
            db.accept_snapshot(&snapshot("01", 100, 10)).unwrap(),
            SnapshotVerdict::Backflow
        );
    }

    #[test]
    fn test_status_suppression() {
        let mut db = MktDatabase::new();
        db.subscribe(MktType::Stk).unwrap();

        assert_eq!(
            db.accept_status(&status("01", "T111    ")).unwrap(),
            StatusVerdict::Accept
        );
        assert_eq!(
            db.accept_status(&status("01", "T111    ")).unwrap(),
            StatusVerdict::Unchanged
        );
        assert_eq!(
            db.accept_status(&status("01", "E011    ")).unwrap(),
            StatusVerdict::Accept
        );

        assert_eq!(
            db.accept_status(&status("02", "T111    ")).unwrap(),
            StatusVerdict::Unsubscribed
        );
    }

    #[test]
    fn test_convert_mkt_data() {
        let mut msg = StepMessage::new(MessageBody::MdSnapshot(snapshot("01", 100, 10)));
        msg.sending_time = "20140815-09:30:00".to_string();

        let data = convert_mkt_data(&msg).unwrap();
        assert_eq!(data.mkt_time, "20140815");
        assert_eq!(data.mkt_type, MktType::Stk);
        assert_eq!(data.trad_ses_mode, TrdSesMode::Production);
        assert_eq!(data.appl_id, 100);
        assert_eq!(data.appl_seq_num, 10);
    }

    #[test]
    fn test_convert_mkt_status() {
        let msg = StepMessage::new(MessageBody::TradingStatus(status("02", "T111    ")));
        let converted = convert_mkt_status(&msg).unwrap();
        assert_eq!(converted.mkt_type, MktType::Dev);
        assert_eq!(converted.mkt_status, "T111    ");
        assert_eq!(converted.tot_no_related_sym, 100);
    }
}
