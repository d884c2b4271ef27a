//! Client library for the STEP market-data feed: reliable TCP sessions
//! with logon/heartbeat, UDP multicast fan-in, subscription and
//! sequencing enforcement, and an asynchronous callback interface. Each
//! handle owns one socket and one worker thread; all callbacks for a
//! handle are delivered from that thread.

pub mod api;
pub mod config;
pub mod driver;
pub mod last_error;
pub mod logging;
pub mod mktdb;
pub mod net;
pub mod queue;
pub mod spi;
pub mod support;

pub use crate::api::{
    close_handle, connect, disconnect, init_lib, login, logout, open_handle, register_spi,
    subscribe, uninit_lib,
};
pub use crate::config::ClientConfig;
pub use crate::last_error::{last_error, last_error_code};
pub use crate::spi::{
    ClientSpi, ConnMode, EventKind, MktData, MktStatus, MktType, TrdSesMode,
};
pub use crate::support::{EpsError, EpsResult};
