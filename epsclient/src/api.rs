//! Library lifecycle and the handle registry: a fixed table of 32 slots,
//! each owning one driver. The registry mutex covers allocation, lookup,
//! and destruction only; driver operations run on a cloned handle after
//! the lock is released.

use crate::driver::tcp::TcpDriver;
use crate::driver::udp::UdpDriver;
use crate::last_error;
use crate::logging::{self, Logger};
use crate::spi::{ClientSpi, ConnMode, MktType};
use crate::support::*;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

static LIB_INITED: AtomicBool = AtomicBool::new(false);

enum Driver {
    Tcp(TcpDriver),
    Udp(UdpDriver),
}

struct HandleEntry {
    hid: u32,
    #[allow(dead_code)]
    mode: ConnMode,
    driver: Arc<Driver>,
}

struct HandlePool {
    slots: Vec<Option<HandleEntry>>,
    log: Option<Logger>,
}

lazy_static! {
    static ref HANDLE_POOL: Mutex<HandlePool> = Mutex::new(HandlePool {
        slots: Vec::new(),
        log: None,
    });
}

/// One-time library setup. The compare-and-swap makes initialization
/// idempotent and race-free across threads.
pub fn init_lib() -> EpsResult<()> {
    api(|| {
        if LIB_INITED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EpsError::DuplicateInited("library"));
        }

        let mut pool = lock_pool();
        pool.slots = (0..HANDLE_MAX_COUNT).map(|_| None).collect();
        pool.log = Some(logging::terminal());
        Ok(())
    })
}

/// Tears the library down, closing every live handle. Calling it on an
/// uninitialized library is a no-op.
pub fn uninit_lib() -> EpsResult<()> {
    api(|| {
        if LIB_INITED
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let entries: Vec<HandleEntry> = {
            let mut pool = lock_pool();
            pool.log = None;
            pool.slots.drain(..).flatten().collect()
        };

        for entry in entries {
            let _ = shutdown_driver(&entry.driver);
        }
        Ok(())
    })
}

/// Allocates a handle of the given connection mode. Handle ids start at
/// 1; a freed slot is reused by the next allocation.
pub fn open_handle(mode: ConnMode) -> EpsResult<u32> {
    api(|| {
        ensure_inited()?;

        let mut pool = lock_pool();
        let log = pool.log.clone();
        let slot = pool
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(EpsError::HidCountBeyondLimit)?;

        let hid = slot as u32 + 1;
        let driver = match mode {
            ConnMode::Tcp => Driver::Tcp(TcpDriver::new(hid, log.as_ref())),
            ConnMode::Udp => Driver::Udp(UdpDriver::new(hid, log.as_ref())),
        };
        pool.slots[slot] = Some(HandleEntry {
            hid,
            mode,
            driver: Arc::new(driver),
        });

        Ok(hid)
    })
}

/// Destroys a handle; disconnects first, idempotently.
pub fn close_handle(hid: u32) -> EpsResult<()> {
    api(|| {
        ensure_inited()?;

        let entry = {
            let mut pool = lock_pool();
            let slot = slot_index(hid)?;
            pool.slots
                .get_mut(slot)
                .and_then(Option::take)
                .ok_or(EpsError::InvalidHid)?
        };
        debug_assert_eq!(entry.hid, hid);

        // Registry lock released: stopping a worker can take a tick.
        shutdown_driver(&entry.driver)
    })
}

pub fn register_spi(hid: u32, spi: Arc<dyn ClientSpi>) -> EpsResult<()> {
    api(|| {
        let driver = find_driver(hid)?;
        match driver.as_ref() {
            Driver::Tcp(driver) => driver.register_spi(spi),
            Driver::Udp(driver) => driver.register_spi(spi),
        }
        Ok(())
    })
}

pub fn connect(hid: u32, address: &str) -> EpsResult<()> {
    api(|| {
        if address.is_empty() {
            return Err(EpsError::InvalidParm("address"));
        }

        let driver = find_driver(hid)?;
        match driver.as_ref() {
            Driver::Tcp(driver) => driver.connect(address),
            Driver::Udp(driver) => driver.connect(address),
        }
    })
}

pub fn disconnect(hid: u32) -> EpsResult<()> {
    api(|| {
        let driver = find_driver(hid)?;
        shutdown_driver(&driver)
    })
}

pub fn login(hid: u32, username: &str, password: &str, heartbeat_intl: u16) -> EpsResult<()> {
    api(|| {
        if username.is_empty() {
            return Err(EpsError::InvalidParm("username"));
        }
        if password.is_empty() {
            return Err(EpsError::InvalidParm("password"));
        }

        let driver = find_driver(hid)?;
        match driver.as_ref() {
            Driver::Tcp(driver) => driver.login(username, password, heartbeat_intl),
            Driver::Udp(driver) => driver.login(username, password, heartbeat_intl),
        }
    })
}

pub fn logout(hid: u32, reason: &str) -> EpsResult<()> {
    api(|| {
        let driver = find_driver(hid)?;
        match driver.as_ref() {
            Driver::Tcp(driver) => driver.logout(reason),
            Driver::Udp(driver) => driver.logout(reason),
        }
    })
}

pub fn subscribe(hid: u32, mkt_type: MktType) -> EpsResult<()> {
    api(|| {
        let driver = find_driver(hid)?;
        match driver.as_ref() {
            Driver::Tcp(driver) => driver.subscribe(mkt_type),
            Driver::Udp(driver) => driver.subscribe(mkt_type),
        }
    })
}

fn shutdown_driver(driver: &Arc<Driver>) -> EpsResult<()> {
    match driver.as_ref() {
        Driver::Tcp(driver) => driver.disconnect(),
        Driver::Udp(driver) => driver.disconnect(),
    }
}

fn find_driver(hid: u32) -> EpsResult<Arc<Driver>> {
    ensure_inited()?;

    let pool = lock_pool();
    let slot = slot_index(hid)?;
    pool.slots
        .get(slot)
        .and_then(|slot| slot.as_ref())
        .map(|entry| Arc::clone(&entry.driver))
        .ok_or(EpsError::InvalidHid)
}

fn slot_index(hid: u32) -> EpsResult<usize> {
    if hid == 0 || hid > HANDLE_MAX_COUNT as u32 {
        return Err(EpsError::InvalidHid);
    }
    Ok(hid as usize - 1)
}

fn ensure_inited() -> EpsResult<()> {
    if !LIB_INITED.load(Ordering::Acquire) {
        return Err(EpsError::Uninited("library"));
    }
    Ok(())
}

fn lock_pool() -> std::sync::MutexGuard<'static, HandlePool> {
    HANDLE_POOL.lock().expect("handle pool lock poisoned")
}

/// Runs one public operation, mirroring any failure into the
/// thread-local last-error slot.
fn api<T>(op: impl FnOnce() -> EpsResult<T>) -> EpsResult<T> {
    let result = op();
    if let Err(error) = &result {
        last_error::record(error);
    }
    result
}
