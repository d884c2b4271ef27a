//! UDP multicast channel. Connectionless at the wire level: "open" means
//! bind-and-join, and the session verbs (login, logout, subscribe) travel
//! through a control-event queue that the worker turns into callbacks so
//! their ordering matches data delivery.

use crate::logging::{self, Logger};
use crate::net::{ChannelStatus, ChannelVerdict, RecvEvent, StatusCell};
use crate::queue::BoundedQueue;
use crate::spi::MktType;
use crate::support::*;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Local session verbs posted by the driver; the worker synthesizes the
/// matching success callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Login,
    Logout,
    Subscribed(MktType),
}

pub trait UdpChannelListener: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self, error: &EpsError);
    fn on_received(&self, event: RecvEvent) -> ChannelVerdict;
    fn on_event(&self, event: ControlEvent);
}

/// Multicast endpoint: group, port, and the local interface address used
/// for the membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpEndpoint {
    pub mc_addr: Ipv4Addr,
    pub mc_port: u16,
    pub local_addr: Ipv4Addr,
}

pub(crate) struct UdpChannelCore {
    status: StatusCell,
    cancel: AtomicBool,
    remote: Mutex<Option<UdpEndpoint>>,
    event_queue: BoundedQueue<ControlEvent>,
    listener: Mutex<Option<Arc<dyn UdpChannelListener>>>,
    worker_id: Mutex<Option<thread::ThreadId>>,
    log: Logger,
}

impl UdpChannelCore {
    pub fn status(&self) -> ChannelStatus {
        self.status.get()
    }

    /// Posts a control event for the worker to deliver.
    pub fn trigger_event(&self, event: ControlEvent) -> EpsResult<()> {
        self.event_queue.push(event)
    }

    fn is_worker_thread(&self) -> bool {
        *self.worker_id.lock().expect("worker id lock poisoned") == Some(thread::current().id())
    }

    fn listener(&self) -> Option<Arc<dyn UdpChannelListener>> {
        self.listener.lock().expect("listener lock poisoned").clone()
    }

    fn notify_connected(&self) {
        if let Some(listener) = self.listener() {
            listener.on_connected();
        }
    }

    fn notify_disconnected(&self, error: &EpsError) {
        if let Some(listener) = self.listener() {
            listener.on_disconnected(error);
        }
    }

    fn notify_received(&self, event: RecvEvent) -> ChannelVerdict {
        match self.listener() {
            Some(listener) => listener.on_received(event),
            None => ChannelVerdict::Continue,
        }
    }

    fn notify_event(&self, event: ControlEvent) {
        if let Some(listener) = self.listener() {
            listener.on_event(event);
        }
    }
}

pub struct UdpChannel {
    core: Arc<UdpChannelCore>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl UdpChannel {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(log: L) -> UdpChannel {
        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!("channel" => "udp")),
            None => Logger::root(logging::Discard, logging::o!()),
        };

        UdpChannel {
            core: Arc::new(UdpChannelCore {
                status: StatusCell::new(ChannelStatus::Stopped),
                cancel: AtomicBool::new(false),
                remote: Mutex::new(None),
                event_queue: BoundedQueue::new(EVENT_QUEUE_SIZE),
                listener: Mutex::new(None),
                worker_id: Mutex::new(None),
                log: channel_log,
            }),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn core(&self) -> Arc<UdpChannelCore> {
        Arc::clone(&self.core)
    }

    pub fn register_listener(&self, listener: Arc<dyn UdpChannelListener>) {
        *self.core.listener.lock().expect("listener lock poisoned") = Some(listener);
    }

    pub fn set_remote(&self, endpoint: UdpEndpoint) {
        *self.core.remote.lock().expect("remote lock poisoned") = Some(endpoint);
    }

    pub fn status(&self) -> ChannelStatus {
        self.core.status.get()
    }

    pub fn trigger_event(&self, event: ControlEvent) -> EpsResult<()> {
        self.core.trigger_event(event)
    }

    pub fn startup(&self) -> EpsResult<()> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");

        if worker.is_some() {
            match self.core.status.get() {
                ChannelStatus::Idle => {
                    self.core.status.set(ChannelStatus::Working);
                    return Ok(());
                }
                ChannelStatus::Working => return Err(EpsError::DuplicateConnect),
                ChannelStatus::Stopped => {
                    if let Some(handle) = worker.take() {
                        let _ = handle.join();
                    }
                }
            }
        }

        self.core.cancel.store(false, Ordering::Release);
        self.core.status.set(ChannelStatus::Working);

        let core = Arc::clone(&self.core);
        let handle = match thread::Builder::new()
            .name("eps-udp-channel".to_string())
            .spawn(move || worker_loop(core))
        {
            Ok(handle) => handle,
            Err(err) => {
                self.core.status.set(ChannelStatus::Stopped);
                return Err(EpsError::OperSystem(err.to_string()));
            }
        };
        *worker = Some(handle);

        Ok(())
    }

    pub fn shutdown(&self) {
        if self.worker.lock().expect("worker lock poisoned").is_none() {
            return;
        }

        if self.core.is_worker_thread() {
            self.core.status.set(ChannelStatus::Idle);
        } else {
            self.core.cancel.store(true, Ordering::Release);
        }
    }

    pub fn join(&self) -> EpsResult<()> {
        if self.core.is_worker_thread() {
            return Ok(());
        }

        let handle = self.worker.lock().expect("worker lock poisoned").take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| EpsError::OperSystem("channel worker panicked".to_string()))?;
        }
        Ok(())
    }
}

fn worker_loop(core: Arc<UdpChannelCore>) {
    *core.worker_id.lock().expect("worker id lock poisoned") = Some(thread::current().id());

    let mut socket: Option<UdpSocket> = None;
    let mut chunk = vec![0u8; RECV_CHUNK_LEN];

    while !core.cancel.load(Ordering::Acquire) {
        if core.status.get() != ChannelStatus::Working {
            socket = None;
            thread::sleep(Duration::from_millis(CHANNEL_IDLE_INTL_MS));
            continue;
        }

        if socket.is_none() {
            match open_socket(&core) {
                Ok(sock) => {
                    logging::debug!(core.log, "multicast membership established";
                                    "context" => "worker");
                    core.event_queue.clear();
                    socket = Some(sock);
                    core.notify_connected();
                }
                Err(error) => {
                    logging::debug!(core.log, "open failed";
                                    "context" => "worker",
                                    "error" => %error);
                    core.notify_disconnected(&error);
                    thread::sleep(Duration::from_millis(CHANNEL_RECONNECT_INTL_MS));
                    continue;
                }
            }
        }

        let serviced = match socket.as_ref() {
            Some(sock) => service_socket(&core, sock, &mut chunk),
            None => continue,
        };

        if let Err(error) = serviced {
            logging::debug!(core.log, "membership lost";
                            "context" => "worker",
                            "error" => %error);
            socket = None;
            core.notify_disconnected(&error);
        }
    }

    core.status.set(ChannelStatus::Stopped);

    logging::debug!(core.log, "channel worker exited"; "context" => "worker");
}

/// One worker iteration: deliver queued control events, then take one
/// receive round. A UDP datagram carries exactly one message.
fn service_socket(
    core: &Arc<UdpChannelCore>,
    sock: &UdpSocket,
    chunk: &mut [u8],
) -> EpsResult<()> {
    while let Some(event) = core.event_queue.pop() {
        core.notify_event(event);
    }

    let verdict = match sock.recv(chunk) {
        Ok(count) => core.notify_received(RecvEvent::Data(&chunk[..count])),
        Err(err)
            if err.kind() == std::io::ErrorKind::WouldBlock
                || err.kind() == std::io::ErrorKind::TimedOut =>
        {
            core.notify_received(RecvEvent::Timeout)
        }
        Err(err) => return Err(err.into()),
    };

    match verdict {
        ChannelVerdict::Continue => Ok(()),
        ChannelVerdict::Reset(error) => Err(error),
    }
}

fn open_socket(core: &Arc<UdpChannelCore>) -> EpsResult<UdpSocket> {
    let endpoint = core
        .remote
        .lock()
        .expect("remote lock poisoned")
        .ok_or(EpsError::InvalidAddress)?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), endpoint.mc_port).into())?;
    socket.set_recv_buffer_size(SOCKET_RECV_BUFFER_LEN)?;
    socket.join_multicast_v4(&endpoint.mc_addr, &endpoint.local_addr)?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(Duration::from_millis(SOCKET_RECV_TIMEOUT_MS)))?;
    Ok(socket)
}
