//! Thread-local record of the most recent API failure. The `Result`
//! returns are the primary error path; this is a convenience shim so a
//! caller can ask for a description after the fact.

use crate::support::EpsError;
use std::cell::RefCell;

thread_local! {
    static LAST_ERROR: RefCell<(u32, String)> = RefCell::new((0, String::new()));
}

pub(crate) fn record(err: &EpsError) {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = (err.code(), err.to_string());
    });
}

pub(crate) fn clear() {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = (0, String::new());
    });
}

/// Description of the most recent failure on this thread, empty if none.
pub fn last_error() -> String {
    LAST_ERROR.with(|slot| slot.borrow().1.clone())
}

/// Code of the most recent failure on this thread, zero if none.
pub fn last_error_code() -> u32 {
    LAST_ERROR.with(|slot| slot.borrow().0)
}
