//! Termination signals for both process roles.
//!
//! SIGINT and SIGTERM are treated alike: the orchestrator starts its
//! shutdown protocol, a worker stops between ticks.

use std::io;
use tokio::signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    /// Register handlers. Must run inside a tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind as Unix};
            Ok(Self {
                interrupt: signal(Unix::interrupt())?,
                terminate: signal(Unix::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination signal.
    pub async fn recv(&mut self) -> SignalKind {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => SignalKind::Interrupt,
                _ = self.terminate.recv() => SignalKind::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(()) => SignalKind::Interrupt,
                Err(_) => std::future::pending().await,
            }
        }
    }
}
