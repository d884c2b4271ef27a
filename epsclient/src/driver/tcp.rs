//! TCP session driver: the state machine between the reliable channel
//! and the application. Requests go out through the channel's send queue
//! with a per-session monotone sequence number; decoded responses drive
//! state transitions and user callbacks.

use crate::driver::{
    build_heartbeat, build_logon, build_logout, build_md_request, dispatch, failure, warning,
    Notice,
};
use crate::logging::{self, Logger};
use crate::mktdb::{convert_mkt_data, MktDatabase, SnapshotVerdict};
use crate::net::buffer::Buffer;
use crate::net::tcp::{TcpChannel, TcpChannelCore, TcpChannelListener};
use crate::net::{ChannelVerdict, RecvEvent};
use crate::spi::{ClientSpi, MktType, NullSpi};
use crate::support::*;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use step::validator::{validate, Direction};
use step::{decode, MessageBody, StepError, StepMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    LoggingIn,
    LoggedIn,
    Publishing,
    LoggingOut,
    LoggedOut,
}

pub(crate) struct TcpDriverCore {
    hid: u32,
    state: SessionState,
    /// Next outbound MsgSeqNum; restarts at 1 on every (re)connect.
    msg_seq_num: u64,
    heartbeat_intl: u16,
    username: String,
    password: String,
    recv_buffer: Buffer,
    recv_idle_ticks: u64,
    comm_idle_ticks: u64,
    mktdb: MktDatabase,
    spi: Arc<dyn ClientSpi>,
    channel: Arc<TcpChannelCore>,
    log: Logger,
}

pub struct TcpDriver {
    hid: u32,
    core: Arc<Mutex<TcpDriverCore>>,
    channel: TcpChannel,
}

impl TcpDriver {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(hid: u32, log: L) -> TcpDriver {
        let driver_log = match log.into() {
            Some(log) => log.new(logging::o!("driver" => "tcp", "hid" => hid)),
            None => Logger::root(logging::Discard, logging::o!()),
        };

        let channel = TcpChannel::new(&driver_log);
        let core = Arc::new(Mutex::new(TcpDriverCore {
            hid,
            state: SessionState::Disconnected,
            msg_seq_num: 1,
            heartbeat_intl: 0,
            username: String::new(),
            password: String::new(),
            recv_buffer: Buffer::new(RECV_BUFFER_LEN),
            recv_idle_ticks: 0,
            comm_idle_ticks: 0,
            mktdb: MktDatabase::new(),
            spi: Arc::new(NullSpi),
            channel: channel.core(),
            log: driver_log,
        }));

        channel.register_listener(Arc::new(TcpDriverListener {
            core: Arc::downgrade(&core),
        }));

        TcpDriver { hid, core, channel }
    }

    pub fn hid(&self) -> u32 {
        self.hid
    }

    pub fn register_spi(&self, spi: Arc<dyn ClientSpi>) {
        self.lock_core().spi = spi;
    }

    /// Starts the channel against `host:port`. A live channel refuses a
    /// second connect without touching its address.
    pub fn connect(&self, address: &str) -> EpsResult<()> {
        let endpoint = parse_address(address)?;

        let _core = self.lock_core();
        if self.channel.status() == crate::net::ChannelStatus::Working {
            return Err(EpsError::DuplicateConnect);
        }
        self.channel.set_remote(endpoint.0, endpoint.1);
        self.channel.startup()
    }

    /// Stops the channel and waits for the worker; idempotent. No
    /// disconnect callback fires for a user-initiated stop.
    pub fn disconnect(&self) -> EpsResult<()> {
        self.channel.shutdown();
        self.channel.join()
    }

    pub fn login(&self, username: &str, password: &str, heartbeat_intl: u16) -> EpsResult<()> {
        let mut core = self.lock_core();

        if core.state != SessionState::Connected {
            return Err(EpsError::InvalidOperation(format!(
                "login operation disallowed in current status({:?})",
                core.state
            )));
        }

        core.username = username.to_string();
        core.password = password.to_string();
        core.heartbeat_intl = heartbeat_intl;

        let seq = core.next_seq();
        let wire = build_logon(seq, &core.username, &core.password, core.heartbeat_intl)?;
        core.state = SessionState::LoggingIn;
        core.channel.send(wire)
    }

    pub fn logout(&self, reason: &str) -> EpsResult<()> {
        let mut core = self.lock_core();

        if core.state != SessionState::LoggedIn && core.state != SessionState::Publishing {
            return Err(EpsError::InvalidOperation(format!(
                "logout operation disallowed in current status({:?})",
                core.state
            )));
        }

        let seq = core.next_seq();
        let wire = build_logout(seq, reason)?;
        core.state = SessionState::LoggingOut;
        core.channel.send(wire)
    }

    pub fn subscribe(&self, mkt_type: MktType) -> EpsResult<()> {
        let mut core = self.lock_core();

        if core.state != SessionState::LoggedIn && core.state != SessionState::Publishing {
            return Err(EpsError::InvalidOperation(format!(
                "subscribe operation disallowed in current status({:?})",
                core.state
            )));
        }

        core.mktdb.subscribe(mkt_type)?;

        let seq = core.next_seq();
        let wire = build_md_request(seq, mkt_type)?;
        core.channel.send(wire)
    }

    fn lock_core(&self) -> std::sync::MutexGuard<TcpDriverCore> {
        self.core.lock().expect("driver lock poisoned")
    }
}

impl TcpDriverCore {
    fn next_seq(&mut self) -> u64 {
        let seq = self.msg_seq_num;
        self.msg_seq_num += 1;
        seq
    }

    fn on_connected(&mut self) -> Vec<Notice> {
        logging::debug!(self.log, "session connected"; "context" => "listener");
        self.state = SessionState::Connected;
        vec![Notice::Connected]
    }

    fn on_disconnected(&mut self, error: &EpsError) -> Vec<Notice> {
        logging::debug!(self.log, "session disconnected";
                        "context" => "listener",
                        "error" => %error);
        self.state = SessionState::Disconnected;
        self.msg_seq_num = 1;
        self.recv_buffer.clear();
        self.recv_idle_ticks = 0;
        self.comm_idle_ticks = 0;
        self.mktdb.unsubscribe_all();

        vec![Notice::Disconnected {
            code: error.code(),
            reason: error.to_string(),
        }]
    }

    fn on_received(&mut self, event: RecvEvent) -> (ChannelVerdict, Vec<Notice>) {
        match event {
            RecvEvent::Data(data) => self.on_data(data),
            RecvEvent::Timeout => self.on_timeout_tick(),
        }
    }

    fn on_data(&mut self, data: &[u8]) -> (ChannelVerdict, Vec<Notice>) {
        let mut notices = Vec::new();
        match self.consume_stream(data, &mut notices) {
            Ok(()) => (ChannelVerdict::Continue, notices),
            Err(error) => {
                notices.push(failure(&error));
                (ChannelVerdict::Reset(error), notices)
            }
        }
    }

    /// Appends one socket read to the reassembly buffer and decodes as
    /// many complete messages as it now holds.
    fn consume_stream(&mut self, data: &[u8], notices: &mut Vec<Notice>) -> EpsResult<()> {
        self.recv_buffer.extend(data)?;

        loop {
            let (msg, consumed) = match decode(self.recv_buffer.read_slice()) {
                Ok(decoded) => decoded,
                Err(StepError::Wait) => break,
                Err(error) => return Err(error.into()),
            };
            self.recv_buffer.consume(consumed);

            validate(&msg, Direction::Response)?;
            self.handle_message(&msg, notices)?;

            self.recv_idle_ticks = 0;
            self.comm_idle_ticks = 0;
        }

        self.recv_buffer.compact();
        Ok(())
    }

    fn handle_message(&mut self, msg: &StepMessage, notices: &mut Vec<Notice>) -> EpsResult<()> {
        match &msg.body {
            MessageBody::Logon(record) => {
                self.state = SessionState::LoggedIn;
                let heartbeat = record
                    .heart_bt_int
                    .map(|value| value as u16)
                    .unwrap_or(self.heartbeat_intl);
                self.heartbeat_intl = heartbeat;

                notices.push(Notice::LoginRsp {
                    heartbeat_intl: heartbeat,
                    code: NO_ERR,
                    reason: "login succeed".to_string(),
                });
            }
            MessageBody::Logout(record) => {
                // Branch on the state before the transition: a logout
                // during login is a login failure, during subscription a
                // subscribe failure.
                let prior = self.state;
                self.state = SessionState::LoggedOut;
                self.mktdb.unsubscribe_all();

                match prior {
                    SessionState::LoggingIn => notices.push(Notice::LoginRsp {
                        heartbeat_intl: self.heartbeat_intl,
                        code: EpsError::LoginFailed.code(),
                        reason: record.text.clone(),
                    }),
                    SessionState::LoggingOut => notices.push(Notice::LogoutRsp {
                        code: NO_ERR,
                        reason: record.text.clone(),
                    }),
                    SessionState::Publishing => notices.push(Notice::MktDataSubRsp {
                        mkt_type: MktType::All,
                        code: EpsError::SubMarketDataFailed.code(),
                        reason: record.text.clone(),
                    }),
                    _ => notices.push(Notice::LogoutRsp {
                        code: NO_ERR,
                        reason: record.text.clone(),
                    }),
                }
            }
            MessageBody::MdRequest(record) => {
                self.state = SessionState::Publishing;
                let mkt_type = MktType::from_code(&record.security_type).unwrap_or(MktType::All);
                notices.push(Notice::MktDataSubRsp {
                    mkt_type,
                    code: NO_ERR,
                    reason: "subscribe succeed".to_string(),
                });
            }
            MessageBody::MdSnapshot(record) => match self.mktdb.accept_snapshot(record)? {
                SnapshotVerdict::Unsubscribed | SnapshotVerdict::Backflow => (),
                SnapshotVerdict::SourceChanged => {
                    notices.push(warning(&EpsError::DataSourceChanged));
                    notices.push(Notice::MktDataArrived(convert_mkt_data(msg)?));
                }
                SnapshotVerdict::Accept => {
                    notices.push(Notice::MktDataArrived(convert_mkt_data(msg)?));
                }
            },
            MessageBody::Heartbeat(_) | MessageBody::TradingStatus(_) => (),
        }
        Ok(())
    }

    /// One receive-timeout tick (~1 s): drives the outbound heartbeat and
    /// the keepalive warning. Reporting only, never a disconnect.
    fn on_timeout_tick(&mut self) -> (ChannelVerdict, Vec<Notice>) {
        let mut notices = Vec::new();

        if self.state != SessionState::LoggedIn && self.state != SessionState::Publishing {
            return (ChannelVerdict::Continue, notices);
        }

        self.recv_idle_ticks += 1;
        self.comm_idle_ticks += 1;

        if self.comm_idle_ticks * SOCKET_RECV_TIMEOUT_MS >= u64::from(self.heartbeat_intl) * 1000 {
            let seq = self.next_seq();
            let sent = build_heartbeat(seq).and_then(|wire| self.channel.send(wire));
            match sent {
                Ok(()) => self.comm_idle_ticks = 0,
                Err(error) => {
                    notices.push(failure(&error));
                    return (ChannelVerdict::Reset(error), notices);
                }
            }
        }

        if self.recv_idle_ticks * SOCKET_RECV_TIMEOUT_MS >= DRIVER_KEEPALIVE_TIME_MS {
            notices.push(warning(&EpsError::CheckKeepaliveTimeout));
            self.recv_idle_ticks = 0;
        }

        (ChannelVerdict::Continue, notices)
    }
}

struct TcpDriverListener {
    core: Weak<Mutex<TcpDriverCore>>,
}

impl TcpChannelListener for TcpDriverListener {
    fn on_connected(&self) {
        if let Some(core) = self.core.upgrade() {
            let (notices, hid, spi) = {
                let mut guard = core.lock().expect("driver lock poisoned");
                (guard.on_connected(), guard.hid, Arc::clone(&guard.spi))
            };
            dispatch(&spi, hid, notices);
        }
    }

    fn on_disconnected(&self, error: &EpsError) {
        if let Some(core) = self.core.upgrade() {
            let (notices, hid, spi) = {
                let mut guard = core.lock().expect("driver lock poisoned");
                (guard.on_disconnected(error), guard.hid, Arc::clone(&guard.spi))
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
}

/// `host:port`, IPv4 dotted quad plus decimal port.
fn parse_address(address: &str) -> EpsResult<(Ipv4Addr, u16)> {
    let mut parts = address.splitn(2, ':');
    let host = parts.next().ok_or(EpsError::InvalidAddress)?;
    let port = parts.next().ok_or(EpsError::InvalidAddress)?;

    let host = host.parse().map_err(|_| EpsError::InvalidAddress)?;
    let port = port.parse().map_err(|_| EpsError::InvalidAddress)?;
    Ok((host, port))
}
