// src/signals.rs
//! SIGINT/SIGTERM handling: turns a termination request into a raised
//! `StopSignal`, so the scheduler finishes its current iteration and the
//! stages shut down cleanly.

use crate::scheduler::StopSignal;
use anyhow::{anyhow, Context, Result};
use log::info;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::OnceCell;

static SHUTDOWN: OnceCell<StopSignal> = OnceCell::new();

extern "C" fn request_shutdown(_signal: nix::libc::c_int) {
    // Only an atomic store happens here.
    if let Some(stop) = SHUTDOWN.get() {
        stop.raise();
    }
}

/// Routes SIGINT and SIGTERM to `stop`. Can be installed once per process.
pub fn install_shutdown_handler(stop: &StopSignal) -> Result<()> {
    SHUTDOWN
        .set(stop.clone())
        .map_err(|_| anyhow!("Shutdown handler is already installed"))?;

    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic load and store.
        unsafe { sigaction(signal, &action) }
            .with_context(|| format!("Failed to install {:?} handler", signal))?;
    }
    info!("Shutdown handler installed for SIGINT and SIGTERM");
    Ok(())
}
