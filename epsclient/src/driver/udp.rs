//! UDP session driver. No session state machine: login, logout, and
//! subscribe complete locally and surface as synthesized success
//! callbacks through the channel's control-event queue, keeping them
//! ordered with data delivery. Each datagram carries one message.

use crate::driver::{dispatch, failure, warning, Notice};
use crate::logging::{self, Logger};
use crate::mktdb::{
    convert_mkt_data, convert_mkt_status, MktDatabase, SnapshotVerdict, StatusVerdict,
};
use crate::net::udp::{ControlEvent, UdpChannel, UdpChannelListener, UdpEndpoint};
use crate::net::{ChannelVerdict, RecvEvent};
use crate::spi::{ClientSpi, MktType, NullSpi};
use crate::support::*;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use step::validator::{validate, Direction};
use step::{decode, MessageBody, StepMessage};

pub(crate) struct UdpDriverCore {
    hid: u32,
    heartbeat_intl: u16,
    username: String,
    password: String,
    recv_idle_ticks: u64,
    mktdb: MktDatabase,
    spi: Arc<dyn ClientSpi>,
    log: Logger,
}

pub struct UdpDriver {
    hid: u32,
    core: Arc<Mutex<UdpDriverCore>>,
    channel: UdpChannel,
}

impl UdpDriver {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(hid: u32, log: L) -> UdpDriver {
        let driver_log = match log.into() {
            Some(log) => log.new(logging::o!("driver" => "udp", "hid" => hid)),
            None => Logger::root(logging::Discard, logging::o!()),
        };

        let channel = UdpChannel::new(&driver_log);
        let core = Arc::new(Mutex::new(UdpDriverCore {
            hid,
            heartbeat_intl: 0,
            username: String::new(),
            password: String::new(),
            recv_idle_ticks: 0,
            mktdb: MktDatabase::new(),
            spi: Arc::new(NullSpi),
            log: driver_log,
        }));

        channel.register_listener(Arc::new(UdpDriverListener {
            core: Arc::downgrade(&core),
        }));

        UdpDriver { hid, core, channel }
    }

    pub fn hid(&self) -> u32 {
        self.hid
    }

    pub fn register_spi(&self, spi: Arc<dyn ClientSpi>) {
        self.lock_core().spi = spi;
    }

    /// Starts the channel against `mcAddr:mcPort;localAddr`.
    pub fn connect(&self, address: &str) -> EpsResult<()> {
        let endpoint = parse_address(address)?;

        let _core = self.lock_core();
        if self.channel.status() == crate::net::ChannelStatus::Working {
            return Err(EpsError::DuplicateConnect);
        }
        self.channel.set_remote(endpoint);
        self.channel.startup()
    }

    pub fn disconnect(&self) -> EpsResult<()> {
        self.channel.shutdown();
        self.channel.join()
    }

    /// Completes locally; the worker synthesizes the success callback.
    pub fn login(&self, username: &str, password: &str, heartbeat_intl: u16) -> EpsResult<()> {
        let mut core = self.lock_core();
        core.username = username.to_string();
        core.password = password.to_string();
        core.heartbeat_intl = heartbeat_intl;
        self.channel.trigger_event(ControlEvent::Login)
    }

    pub fn logout(&self, _reason: &str) -> EpsResult<()> {
        let _core = self.lock_core();
        self.channel.trigger_event(ControlEvent::Logout)
    }

    pub fn subscribe(&self, mkt_type: MktType) -> EpsResult<()> {
        let mut core = self.lock_core();
        core.mktdb.subscribe(mkt_type)?;
        self.channel.trigger_event(ControlEvent::Subscribed(mkt_type))
    }

    fn lock_core(&self) -> std::sync::MutexGuard<UdpDriverCore> {
        self.core.lock().expect("driver lock poisoned")
    }
}

impl UdpDriverCore {
    fn on_event(&mut self, event: ControlEvent) -> Vec<Notice> {
        match event {
            ControlEvent::Login => {
                logging::debug!(self.log, "synthesizing login response";
                                "context" => "event",
                                "username" => self.username.as_str());
                vec![Notice::LoginRsp {
                    heartbeat_intl: self.heartbeat_intl,
                    code: NO_ERR,
                    reason: "login succeed".to_string(),
                }]
            }
            ControlEvent::Logout => {
                self.mktdb.unsubscribe_all();
                vec![Notice::LogoutRsp {
                    code: NO_ERR,
                    reason: "logout succeed".to_string(),
                }]
            }
            ControlEvent::Subscribed(mkt_type) => vec![Notice::MktDataSubRsp {
                mkt_type,
                code: NO_ERR,
                reason: "subscribe succeed".to_string(),
            }],
        }
    }

    fn on_received(&mut self, event: RecvEvent) -> (ChannelVerdict, Vec<Notice>) {
        match event {
            RecvEvent::Data(data) => self.on_datagram(data),
            RecvEvent::Timeout => self.on_timeout_tick(),
        }
    }

    fn on_datagram(&mut self, data: &[u8]) -> (ChannelVerdict, Vec<Notice>) {
        let mut notices = Vec::new();
        match self.consume_datagram(data, &mut notices) {
            Ok(()) => (ChannelVerdict::Continue, notices),
            Err(error) => {
                notices.push(failure(&error));
                (ChannelVerdict::Reset(error), notices)
            }
        }
    }

    /// One datagram holds exactly one message; a truncated or corrupt
    /// datagram is fatal for the membership.
    fn consume_datagram(&mut self, data: &[u8], notices: &mut Vec<Notice>) -> EpsResult<()> {
        let (msg, _consumed) = decode(data)?;
        validate(&msg, Direction::Response)?;
        self.handle_message(&msg, notices)
    }

    fn handle_message(&mut self, msg: &StepMessage, notices: &mut Vec<Notice>) -> EpsResult<()> {
        match &msg.body {
            MessageBody::MdSnapshot(record) => {
                match self.mktdb.accept_snapshot(record)? {
                    // Lossy, out-of-order transport: both are routine.
                    SnapshotVerdict::Unsubscribed | SnapshotVerdict::Backflow => (),
                    SnapshotVerdict::SourceChanged => {
                        notices.push(warning(&EpsError::DataSourceChanged));
                        notices.push(Notice::MktDataArrived(convert_mkt_data(msg)?));
                        self.recv_idle_ticks = 0;
                    }
                    SnapshotVerdict::Accept => {
                        notices.push(Notice::MktDataArrived(convert_mkt_data(msg)?));
                        self.recv_idle_ticks = 0;
                    }
                }
            }
            MessageBody::TradingStatus(record) => match self.mktdb.accept_status(record)? {
                StatusVerdict::Unsubscribed | StatusVerdict::Unchanged => (),
                StatusVerdict::Accept => {
                    notices.push(Notice::MktStatusChanged(convert_mkt_status(msg)?));
                    self.recv_idle_ticks = 0;
                }
            },
            _ => {
                logging::trace!(self.log, "ignoring session message";
                                "context" => "datagram",
                                "msg_type" => msg.msg_type().wire());
            }
        }
        Ok(())
    }

    fn on_timeout_tick(&mut self) -> (ChannelVerdict, Vec<Notice>) {
        let mut notices = Vec::new();

        self.recv_idle_ticks += 1;
        if self.recv_idle_ticks * SOCKET_RECV_TIMEOUT_MS >= DRIVER_KEEPALIVE_TIME_MS {
            notices.push(warning(&EpsError::CheckKeepaliveTimeout));
            self.recv_idle_ticks = 0;
        }

        (ChannelVerdict::Continue, notices)
    }
}

struct UdpDriverListener {
    core: Weak<Mutex<UdpDriverCore>>,
}

impl UdpChannelListener for UdpDriverListener {
    fn on_connected(&self) {
        if let Some(core) = self.core.upgrade() {
            let (hid, spi) = {
                let guard = core.lock().expect("driver lock poisoned");
                (guard.hid, Arc::clone(&guard.spi))
            };
            dispatch(&spi, hid, vec![Notice::Connected]);
        }
    }

    fn on_disconnected(&self, error: &EpsError) {
        if let Some(core) = self.core.upgrade() {
            let (notices, hid, spi) = {
                let mut guard = core.lock().expect("driver lock poisoned");
                guard.mktdb.unsubscribe_all();
                guard.recv_idle_ticks = 0;
                let notices = vec![Notice::Disconnected {
                    code: error.code(),
                    reason: error.to_string(),
                }];
                (notices, guard.hid, Arc::clone(&guard.spi))
            };
            dispatch(&spi, hid, notices);
        }
    }

    fn on_received(&self, event: RecvEvent) -> ChannelVerdict {
        match self.core.upgrade() {
            Some(core) => {
                let ((verdict, notices), hid, spi) = {
                    let mut guard = core.lock().expect("driver lock poisoned");
                    (guard.on_received(event), guard.hid, Arc::clone(&guard.spi))
                };
                dispatch(&spi, hid, notices);
                verdict
            }
            None => ChannelVerdict::Continue,
        }
    }

    fn on_event(&self, event: ControlEvent) {
        if let Some(core) = self.core.upgrade() {
            let (notices, hid, spi) = {
                let mut guard = core.lock().expect("driver lock poisoned");
                (guard.on_event(event), guard.hid, Arc::clone(&guard.spi))
            };
            dispatch(&spi, hid, notices);
        }
    }
}

/// `mcAddr:mcPort;localAddr`.
fn parse_address(address: &str) -> EpsResult<UdpEndpoint> {
    let mut outer = address.splitn(2, ';');
    let group_part = outer.next().ok_or(EpsError::InvalidAddress)?;
    let local_part = outer.next().ok_or(EpsError::InvalidAddress)?;

    let mut group = group_part.splitn(2, ':');
    let mc_addr = group.next().ok_or(EpsError::InvalidAddress)?;
    let mc_port = group.next().ok_or(EpsError::InvalidAddress)?;

    Ok(UdpEndpoint {
        mc_addr: mc_addr
            .parse::<Ipv4Addr>()
            .map_err(|_| EpsError::InvalidAddress)?,
        mc_port: mc_port.parse().map_err(|_| EpsError::InvalidAddress)?,
        local_addr: local_part
            .parse::<Ipv4Addr>()
            .map_err(|_| EpsError::InvalidAddress)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::{EventKind, MktData, MktStatus};
    use step::encoder::encode;
    use step::message::*;

    #[derive(Default)]
    struct RecordingSpi {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSpi {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ClientSpi for RecordingSpi {
        fn on_connected(&self, _hid: u32) {
            self.push("connected".to_string());
        }

        fn on_disconnected(&self, _hid: u32, code: u32, _reason: &str) {
            self.push(format!("disconnected:{:#010x}", code));
        }

        fn on_login_rsp(&self, _hid: u32, heartbeat_intl: u16, code: u32, _reason: &str) {
            self.push(format!("login:{}:{}", code, heartbeat_intl));
        }

        fn on_logout_rsp(&self, _hid: u32, code: u32, _reason: &str) {
            self.push(format!("logout:{}", code));
        }

        fn on_mkt_data_sub_rsp(&self, _hid: u32, mkt_type: MktType, code: u32, _reason: &str) {
            self.push(format!("subrsp:{:?}:{}", mkt_type, code));
        }

        fn on_mkt_data_arrived(&self, _hid: u32, data: &MktData) {
            self.push(format!("data:{:?}:{}", data.mkt_type, data.appl_seq_num));
        }

        fn on_mkt_status_changed(&self, _hid: u32, status: &MktStatus) {
            self.push(format!("status:{:?}:{}", status.mkt_type, status.mkt_status));
        }

        fn on_event_occurred(&self, _hid: u32, kind: EventKind, code: u32, _text: &str) {
            self.push(format!("event:{:?}:{:#010x}", kind, code));
        }
    }

    fn harness() -> (UdpDriver, Arc<RecordingSpi>, UdpDriverListener) {
        let driver = UdpDriver::new(3, None);
        let spi = Arc::new(RecordingSpi::default());
        driver.register_spi(spi.clone());
        let listener = UdpDriverListener {
            core: Arc::downgrade(&driver.core),
        };
        (driver, spi, listener)
    }

    fn datagram(body: MessageBody) -> Vec<u8> {
        let mut msg = StepMessage::new(body);
        msg.sender_comp_id = TARGET_COMP_ID.to_string();
        msg.target_comp_id = SENDER_COMP_ID.to_string();
        msg.msg_seq_num = 1;
        msg.sending_time = "20140815-09:30:00".to_string();

        let mut buf = [0u8; MSG_MAX_LEN];
        let size = encode(&msg, &mut buf).unwrap();
        buf[..size].to_vec()
    }

    fn snapshot(security_type: &str, appl_id: u32, appl_seq_num: u64) -> Vec<u8> {
        datagram(MessageBody::MdSnapshot(MdSnapshotRecord {
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
        }))
    }

    fn status(security_type: &str, session_id: &str) -> Vec<u8> {
        datagram(MessageBody::TradingStatus(TradingStatusRecord {
            security_type: security_type.to_string(),
            trad_ses_mode: Some(3),
            trading_session_id: session_id.to_string(),
            tot_no_related_sym: Some(100),
        }))
    }

    #[test]
    fn test_control_events_synthesize_callbacks() {
        let (driver, spi, listener) = harness();

        driver.login("u001", "secret", 30).unwrap();
        driver.subscribe(MktType::Stk).unwrap();

        // The worker delivers queued events in order.
        listener.on_event(ControlEvent::Login);
        listener.on_event(ControlEvent::Subscribed(MktType::Stk));
        assert_eq!(spi.take(), vec!["login:0:30", "subrsp:Stk:0"]);

        listener.on_event(ControlEvent::Logout);
        assert_eq!(spi.take(), vec!["logout:0"]);
        assert!(!driver.lock_core().mktdb.is_subscribed(MktType::Stk));
    }

    #[test]
    fn test_snapshot_delivery_and_silent_backflow() {
        let (driver, spi, listener) = harness();
        driver.subscribe(MktType::Stk).unwrap();

        listener.on_received(RecvEvent::Data(&snapshot("01", 100, 10)));
        assert_eq!(spi.take(), vec!["data:Stk:10"]);

        // Out-of-order datagrams vanish without any callback.
        listener.on_received(RecvEvent::Data(&snapshot("01", 100, 9)));
        listener.on_received(RecvEvent::Data(&snapshot("01", 100, 10)));
        assert_eq!(spi.take(), Vec::<String>::new());

        listener.on_received(RecvEvent::Data(&snapshot("01", 100, 11)));
        assert_eq!(spi.take(), vec!["data:Stk:11"]);
    }

    #[test]
    fn test_source_change_warns_once() {
        let (driver, spi, listener) = harness();
        driver.subscribe(MktType::Stk).unwrap();

        listener.on_received(RecvEvent::Data(&snapshot("01", 100, 10)));
        spi.take();

        listener.on_received(RecvEvent::Data(&snapshot("01", 200, 1)));
        assert_eq!(
            spi.take(),
            vec![
                format!("event:Warning:{:#010x}", EpsError::DataSourceChanged.code()),
                "data:Stk:1".to_string()
            ]
        );

        listener.on_received(RecvEvent::Data(&snapshot("01", 200, 2)));
        assert_eq!(spi.take(), vec!["data:Stk:2"]);
    }

    #[test]
    fn test_status_changes_and_suppression() {
        let (driver, spi, listener) = harness();
        driver.subscribe(MktType::All).unwrap();

        listener.on_received(RecvEvent::Data(&status("01", "T111    ")));
        listener.on_received(RecvEvent::Data(&status("01", "T111    ")));
        listener.on_received(RecvEvent::Data(&status("01", "E011    ")));
        assert_eq!(spi.take(), vec!["status:Stk:T111    ", "status:Stk:E011    "]);
    }

    #[test]
    fn test_corrupt_datagram_resets_membership() {
        let (_driver, spi, listener) = harness();

        let verdict = listener.on_received(RecvEvent::Data(b"8=FIXT.1.1\x01garbage"));
        match verdict {
            ChannelVerdict::Reset(_) => (),
            ChannelVerdict::Continue => panic!("corrupt datagram must reset"),
        }
        let events = spi.take();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("event:Error:"));
    }

    #[test]
    fn test_keepalive_warning() {
        let (_driver, spi, listener) = harness();

        for _ in 0..35 {
            listener.on_received(RecvEvent::Timeout);
        }
        assert_eq!(
            spi.take(),
            vec![format!(
                "event:Warning:{:#010x}",
                EpsError::CheckKeepaliveTimeout.code()
            )]
        );
    }

    #[test]
    fn test_parse_address() {
        let endpoint = parse_address("230.11.1.1:3333;196.123.71.1").unwrap();
        assert_eq!(endpoint.mc_addr, "230.11.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(endpoint.mc_port, 3333);
        assert_eq!(
            endpoint.local_addr,
            "196.123.71.1".parse::<Ipv4Addr>().unwrap()
        );

        assert_eq!(
            parse_address("230.11.1.1:3333").unwrap_err(),
            EpsError::InvalidAddress
        );
        assert_eq!(
            parse_address("230.11.1.1;196.123.71.1").unwrap_err(),
            EpsError::InvalidAddress
        );
        assert_eq!(
            parse_address("230.11.1.1:x;196.123.71.1").unwrap_err(),
            EpsError::InvalidAddress
        );
    }
}
