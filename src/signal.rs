//! Ctrl-C handling
//!
//! The first SIGINT cancels the run at the next dep boundary, letting the
//! hook that is running finish. A second one exits immediately.

use depkit::CancelToken;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

static TOKEN: OnceLock<CancelToken> = OnceLock::new();
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT handler and return the token it cancels
pub fn install() -> CancelToken {
    let token = TOKEN.get_or_init(CancelToken::new).clone();

    #[cfg(unix)]
    unsafe {
        let handler = on_interrupt as extern "C" fn(libc::c_int);
        if libc::signal(libc::SIGINT, handler as libc::sighandler_t) == libc::SIG_ERR {
            log::warn!("could not install Ctrl-C handler");
        }
    }

    token
}

/// Whether Ctrl-C was pressed during this process
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    // Only async-signal-safe work here: atomics and _exit
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        unsafe { libc::_exit(130) };
    }
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_returns_shared_token() {
        let a = install();
        let b = install();
        a.cancel();
        assert!(b.is_cancelled());
        a.reset();
        assert!(!interrupted());
    }
}
