//! TCP channel: a reconnecting client socket owned by one worker thread.
//! Producers enqueue outbound buffers; the worker drains the queue, then
//! blocks in a receive with a one-second timeout that doubles as the
//! keepalive tick for the driver above.

use crate::logging::{self, Logger};
use crate::net::{ChannelStatus, ChannelVerdict, RecvEvent, StatusCell};
use crate::queue::BoundedQueue;
use crate::support::*;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Callbacks a channel delivers from its worker thread. The listener
/// decides through the returned verdict whether the connection survives
/// the received data.
pub trait TcpChannelListener: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self, error: &EpsError);
    fn on_received(&self, event: RecvEvent) -> ChannelVerdict;
}

pub(crate) struct TcpChannelCore {
    status: StatusCell,
    cancel: AtomicBool,
    remote: Mutex<Option<(Ipv4Addr, u16)>>,
    pub(crate) send_queue: BoundedQueue<Vec<u8>>,
    listener: Mutex<Option<Arc<dyn TcpChannelListener>>>,
    worker_id: Mutex<Option<thread::ThreadId>>,
    log: Logger,
}

impl TcpChannelCore {
    pub fn status(&self) -> ChannelStatus {
        self.status.get()
    }

    /// Queues one outbound buffer for the worker. Overflow is returned to
    /// the producer.
    pub fn send(&self, data: Vec<u8>) -> EpsResult<()> {
        if data.is_empty() || data.len() > SEND_DATA_MAX_LEN {
            return Err(EpsError::InvalidParm("data"));
        }
        self.send_queue.push(data)
    }

    fn is_worker_thread(&self) -> bool {
        *self.worker_id.lock().expect("worker id lock poisoned") == Some(thread::current().id())
    }

    fn listener(&self) -> Option<Arc<dyn TcpChannelListener>> {
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
}

pub struct TcpChannel {
    core: Arc<TcpChannelCore>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TcpChannel {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(log: L) -> TcpChannel {
        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!("channel" => "tcp")),
            None => Logger::root(logging::Discard, logging::o!()),
        };

        TcpChannel {
            core: Arc::new(TcpChannelCore {
                status: StatusCell::new(ChannelStatus::Stopped),
                cancel: AtomicBool::new(false),
                remote: Mutex::new(None),
                send_queue: BoundedQueue::new(SEND_QUEUE_SIZE),
                listener: Mutex::new(None),
                worker_id: Mutex::new(None),
                log: channel_log,
            }),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn core(&self) -> Arc<TcpChannelCore> {
        Arc::clone(&self.core)
    }

    /// Installs the listener. Must happen before `startup`.
    pub fn register_listener(&self, listener: Arc<dyn TcpChannelListener>) {
        *self.core.listener.lock().expect("listener lock poisoned") = Some(listener);
    }

    pub fn set_remote(&self, addr: Ipv4Addr, port: u16) {
        *self.core.remote.lock().expect("remote lock poisoned") = Some((addr, port));
    }

    pub fn status(&self) -> ChannelStatus {
        self.core.status.get()
    }

    /// Spawns the worker, or revives an idle one. A channel already
    /// working refuses a second connect.
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
                    // Cancelled but never joined; reap before respawning.
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
            .name("eps-tcp-channel".to_string())
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

    /// Requests worker exit. From the worker thread itself the channel
    /// only falls idle so the loop can keep running for a later connect.
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

    /// Waits for the worker to exit. A no-op from the worker itself.
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

    pub fn send(&self, data: Vec<u8>) -> EpsResult<()> {
        self.core.send(data)
    }
}

fn worker_loop(core: Arc<TcpChannelCore>) {
    *core.worker_id.lock().expect("worker id lock poisoned") = Some(thread::current().id());

    let mut stream: Option<TcpStream> = None;
    let mut chunk = vec![0u8; RECV_CHUNK_LEN];

    while !core.cancel.load(Ordering::Acquire) {
        if core.status.get() != ChannelStatus::Working {
            if let Some(sock) = stream.take() {
                let _ = sock.shutdown(Shutdown::Both);
            }
            thread::sleep(Duration::from_millis(CHANNEL_IDLE_INTL_MS));
            continue;
        }

        if stream.is_none() {
            match open_socket(&core) {
                Ok(sock) => {
                    logging::debug!(core.log, "channel connected"; "context" => "worker");
                    core.send_queue.clear();
                    stream = Some(sock);
                    core.notify_connected();
                }
                Err(error) => {
                    logging::debug!(core.log, "connect failed";
                                    "context" => "worker",
                                    "error" => %error);
                    core.notify_disconnected(&error);
                    thread::sleep(Duration::from_millis(CHANNEL_RECONNECT_INTL_MS));
                    continue;
                }
            }
        }

        let serviced = match stream.as_mut() {
            Some(sock) => service_socket(&core, sock, &mut chunk),
            None => continue,
        };

        if let Err(error) = serviced {
            logging::debug!(core.log, "connection lost";
                            "context" => "worker",
                            "error" => %error);
            if let Some(sock) = stream.take() {
                let _ = sock.shutdown(Shutdown::Both);
            }
            core.send_queue.clear();
            core.notify_disconnected(&error);
        }
    }

    if let Some(sock) = stream.take() {
        let _ = sock.shutdown(Shutdown::Both);
    }
    core.status.set(ChannelStatus::Stopped);

    logging::debug!(core.log, "channel worker exited"; "context" => "worker");
}

/// One worker iteration on a live socket: flush the outbound queue, then
/// take one receive round.
fn service_socket(
    core: &Arc<TcpChannelCore>,
    sock: &mut TcpStream,
    chunk: &mut [u8],
) -> EpsResult<()> {
    while let Some(item) = core.send_queue.pop() {
        logging::trace!(core.log, "sending"; "context" => "worker", "bytes" => item.len());
        sock.write_all(&item)?;
    }

    let verdict = match sock.read(chunk) {
        Ok(0) => return Err(EpsError::Socket("connection closed by remote".to_string())),
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

fn open_socket(core: &Arc<TcpChannelCore>) -> EpsResult<TcpStream> {
    let (addr, port) = core
        .remote
        .lock()
        .expect("remote lock poisoned")
        .ok_or(EpsError::InvalidAddress)?;

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(SOCKET_RECV_BUFFER_LEN)?;
    socket.connect(&SocketAddr::new(IpAddr::V4(addr), port).into())?;

    let stream: TcpStream = socket.into();
    stream.set_read_timeout(Some(Duration::from_millis(SOCKET_RECV_TIMEOUT_MS)))?;
    Ok(stream)
}
