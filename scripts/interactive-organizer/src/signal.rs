use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use colored::Colorize;

static ARMED: AtomicBool = AtomicBool::new(false);
static PENDING: AtomicBool = AtomicBool::new(false);

/// Installs the Ctrl+C handler. Until [`arm`] is called an interrupt stops
/// the program with exit code 2; afterwards it is only recorded.
pub fn install() -> Result<()> {
    ctrlc::set_handler(|| {
        if ARMED.load(Ordering::SeqCst) {
            notify();
        } else {
            eprintln!("\n{}", "Program stopped!".yellow());
            std::process::exit(2);
        }
    })
    .context("installing the interrupt handler")
}

/// Called once a menu is on screen.
pub fn arm() {
    ARMED.store(true, Ordering::SeqCst);
}

/// Records an interrupt as if Ctrl+C had been pressed while armed.
pub fn notify() {
    PENDING.store(true, Ordering::SeqCst);
}

/// Whether an interrupt is waiting, without consuming it.
pub fn pending() -> bool {
    PENDING.load(Ordering::SeqCst)
}

/// Whether an interrupt arrived since the last call.
pub fn take_pending() -> bool {
    PENDING.swap(false, Ordering::SeqCst)
}
