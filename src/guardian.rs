//! Ownership of every resource a transfer touches, and the path that
//! releases them when the process is interrupted.
//!
//! The interrupt handler never closes anything itself. It raises a flag and
//! knocks the main thread out of whatever blocking call it is in; the main
//! thread then notices the flag, calls [`Session::release`] and exits.

use std::fs::File;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::TransferError;
use crate::protocol::TransferBuffer;

/// How long the handler waits for the main thread to clean up before
/// exiting on its own.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Resources held by one running client or server.
///
/// `None` marks a resource as released, so [`release`](Session::release)
/// can run any number of times.
#[derive(Debug, Default)]
pub struct Session {
    pub buffer: Option<TransferBuffer>,
    pub file: Option<File>,
    pub conn: Option<TcpStream>,
    pub listener: Option<TcpListener>,
}

impl Session {
    pub fn new(capacity: usize) -> Result<Session, TransferError> {
        Ok(Session {
            buffer: Some(TransferBuffer::new(capacity)?),
            ..Session::default()
        })
    }

    /// Closes the file and connection of the current iteration.
    pub fn close_iteration(&mut self) {
        if self.file.take().is_some() {
            debug!("closed file");
        }
        if let Some(conn) = self.conn.take() {
            let _ = conn.shutdown(Shutdown::Both);
            debug!("closed connection");
        }
    }

    /// Releases everything still held.
    pub fn release(&mut self) {
        if self.buffer.take().is_some() {
            debug!("released transfer buffer");
        }
        self.close_iteration();
        if self.listener.take().is_some() {
            debug!("closed listening socket");
        }
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
            && self.file.is_none()
            && self.conn.is_none()
            && self.listener.is_none()
    }
}

#[derive(Debug, Default)]
struct Wake {
    stream: Option<TcpStream>,
    listener: Option<SocketAddr>,
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    wake: Mutex<Wake>,
}

/// Shared between the main loop and the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        ShutdownSignal::default()
    }

    /// Installs the Ctrl-C handler for `role` and returns its signal.
    pub fn install(role: &'static str) -> Result<ShutdownSignal, ctrlc::Error> {
        let signal = ShutdownSignal::new();
        let handler = signal.clone();
        ctrlc::set_handler(move || {
            error!("{}: Interrupted. Shutting down.", role);
            handler.trigger();
            thread::sleep(SHUTDOWN_GRACE);
            error!("{}: cleanup did not finish in time, exiting", role);
            exit(1);
        })?;
        Ok(signal)
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once shutdown has been requested.
    pub fn check(&self) -> Result<(), TransferError> {
        if self.is_requested() {
            return Err(TransferError::Interrupted);
        }
        Ok(())
    }

    /// Registers the connection the main thread may be blocked on.
    ///
    /// If shutdown was already requested the connection is shut down on the
    /// spot, so a trigger that fired just before arming still takes effect.
    pub fn arm_stream(&self, stream: &TcpStream) {
        let clone = match stream.try_clone() {
            Ok(s) => s,
            Err(m) => {
                debug!("cannot register connection for shutdown: {}", m);
                return;
            }
        };
        if let Ok(mut wake) = self.inner.wake.lock() {
            if self.is_requested() {
                let _ = clone.shutdown(Shutdown::Both);
                return;
            }
            wake.stream = Some(clone);
        }
    }

    pub fn disarm_stream(&self) {
        if let Ok(mut wake) = self.inner.wake.lock() {
            wake.stream = None;
        }
    }

    /// Registers the listener the main thread may be blocked accepting on.
    pub fn arm_listener(&self, addr: SocketAddr) {
        let addr = match addr {
            SocketAddr::V4(a) if a.ip().is_unspecified() => {
                SocketAddr::from((Ipv4Addr::LOCALHOST, a.port()))
            }
            other => other,
        };
        if let Ok(mut wake) = self.inner.wake.lock() {
            wake.listener = Some(addr);
        }
    }

    /// Requests shutdown and unblocks the main thread.
    pub fn trigger(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        let (stream, listener) = match self.inner.wake.lock() {
            Ok(mut wake) => (wake.stream.take(), wake.listener.take()),
            Err(_) => (None, None),
        };
        if let Some(s) = stream {
            let _ = s.shutdown(Shutdown::Both);
        }
        if let Some(addr) = listener {
            let _ = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT);
        }
    }
}
