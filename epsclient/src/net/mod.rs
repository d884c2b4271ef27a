//! Networking: one socket, one worker thread, and one queue per channel.
//! The worker is the sole mutator of its socket; every other thread talks
//! to it through the queue and the cancel flag.

pub mod buffer;
pub mod tcp;
pub mod udp;

use std::sync::atomic::{AtomicU8, Ordering};

/// Channel lifecycle. `Idle` keeps the worker alive but disconnected so a
/// later connect can reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Stopped = 0,
    Idle = 1,
    Working = 2,
}

pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: ChannelStatus) -> StatusCell {
        StatusCell(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> ChannelStatus {
        match self.0.load(Ordering::Acquire) {
            0 => ChannelStatus::Stopped,
            1 => ChannelStatus::Idle,
            _ => ChannelStatus::Working,
        }
    }

    pub fn set(&self, status: ChannelStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// What the worker observed on its socket this iteration.
pub enum RecvEvent<'a> {
    Data(&'a [u8]),
    /// The receive timeout elapsed with no data; drives keepalive ticks.
    Timeout,
}

/// Listener's instruction back to the worker. `Reset` makes the worker
/// close its socket, report the error, and re-enter the reconnect loop.
pub enum ChannelVerdict {
    Continue,
    Reset(crate::support::EpsError),
}
