use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::TransferError;
use crate::files::{
    create_output, open_source, output_name, payload_digest, read_up_to, write_payload,
};
use crate::guardian::{Session, ShutdownSignal};
use crate::network::{
    accept, build_listener, connect, new_socket, parse_ipv4, receive_until_closed, send_payload,
};

// 10 MiB, also the largest transferable file
pub const TRANSFER_BUFF_SIZE: usize = 10 * 1024 * 1024;

/// The one buffer every transfer of a process goes through.
pub struct TransferBuffer {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer").field("capacity", &self.bytes.len()).finish()
    }
}

impl TransferBuffer {
    pub fn new(capacity: usize) -> Result<TransferBuffer, TransferError> {
        let mut bytes = Vec::new();
        if bytes.try_reserve_exact(capacity).is_err() {
            return Err(TransferError::Alloc(capacity));
        }
        bytes.resize(capacity, 0);
        Ok(TransferBuffer { bytes })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// What happened to one file on the client side.
#[derive(Debug)]
pub enum Delivery {
    Sent { bytes: usize },
    Failed(TransferError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub sent: usize,
    pub failed: usize,
}

pub struct Client {
    session: Session,
    host: String,
    port: u16,
    shutdown: ShutdownSignal,
}

impl Client {
    pub fn new(
        host: &str,
        port: u16,
        capacity: usize,
        shutdown: ShutdownSignal,
    ) -> Result<Client, TransferError> {
        Ok(Client {
            session: Session::new(capacity)?,
            host: host.to_string(),
            port,
            shutdown,
        })
    }

    /// Sends each path over its own connection, in order.
    ///
    /// Only fatal errors come back as `Err`; a file that could not be sent is
    /// counted in the report and the next one is tried.
    pub fn send_all<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Report, TransferError> {
        let mut report = Report::default();
        for path in paths {
            match self.send_file(path.as_ref())? {
                Delivery::Sent { .. } => report.sent += 1,
                Delivery::Failed(_) => report.failed += 1,
            }
        }
        Ok(report)
    }

    pub fn send_file(&mut self, path: &Path) -> Result<Delivery, TransferError> {
        self.shutdown.check()?;
        let builder = new_socket()?;
        let ip = parse_ipv4(&self.host)?;
        let addr = SocketAddrV4::new(ip, self.port);

        info!("client: Connecting to {}...", addr);
        let stream = connect(&builder, addr)?;
        self.shutdown.arm_stream(&stream);
        self.session.conn = Some(stream);
        self.shutdown.check()?;
        info!("client: Success!");

        info!("client: Sending: {:?}...", path);
        let delivery = self.transfer(path);
        self.session.close_iteration();
        self.shutdown.disarm_stream();
        self.shutdown.check()?;

        match &delivery {
            Ok(Delivery::Sent { bytes }) => info!("client: Done. ({} bytes)", bytes),
            Ok(Delivery::Failed(e)) => error!("client: ERROR: {}", e),
            Err(_) => {}
        }
        delivery
    }

    fn transfer(&mut self, path: &Path) -> Result<Delivery, TransferError> {
        let file = match open_source(path) {
            Ok(f) => f,
            Err(e) => return Ok(Delivery::Failed(e)),
        };
        let file = self.session.file.insert(file);
        let buf = match self.session.buffer.as_mut() {
            Some(b) => b.as_mut_slice(),
            None => return Err(TransferError::BufferReleased),
        };

        let len = match read_up_to(file, buf) {
            Ok(n) => n,
            Err(m) => {
                return Ok(Delivery::Failed(TransferError::Read {
                    path: path.to_path_buf(),
                    source: m,
                }));
            }
        };
        debug!("client: read {} bytes, sha256 {}", len, payload_digest(&buf[..len]));

        let conn = match self.session.conn.as_mut() {
            Some(c) => c,
            None => return Err(TransferError::Interrupted),
        };
        let sent = send_payload(conn, &buf[..len]);
        if sent != len {
            return Ok(Delivery::Failed(TransferError::Send { sent, expected: len }));
        }
        Ok(Delivery::Sent { bytes: sent })
    }

    pub fn release(&mut self) {
        self.session.release();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// What happened to one accepted connection on the server side.
#[derive(Debug)]
pub enum Iteration {
    Saved {
        path: PathBuf,
        received: usize,
        written: usize,
    },
    Dropped(TransferError),
}

pub struct Server {
    session: Session,
    out_dir: PathBuf,
    next_index: u32,
    local_addr: SocketAddr,
    shutdown: ShutdownSignal,
}

impl Server {
    /// Allocates the buffer and starts listening on `addr`.
    pub fn bind(
        addr: SocketAddrV4,
        out_dir: impl Into<PathBuf>,
        capacity: usize,
        shutdown: ShutdownSignal,
    ) -> Result<Server, TransferError> {
        let mut session = Session::new(capacity)?;
        let listener = match build_listener(addr) {
            Ok(l) => l,
            Err(e) => {
                session.release();
                return Err(e);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(a) => a,
            Err(m) => {
                session.release();
                return Err(TransferError::Listen(m));
            }
        };
        if !addr.ip().is_loopback() {
            info!("server: listening on {} which is reachable beyond loopback", addr.ip());
        }
        session.listener = Some(listener);
        shutdown.arm_listener(local_addr);

        Ok(Server {
            session,
            out_dir: out_dir.into(),
            next_index: 1,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Continues numbering at `index` instead of 1, e.g. after a restart.
    pub fn starting_at(mut self, index: u32) -> Server {
        self.next_index = index;
        self
    }

    /// Sequence number the next saved file will get.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Accepts and saves connections until interrupted or a fatal error.
    pub fn serve(&mut self) -> Result<(), TransferError> {
        loop {
            info!(
                "server: Awaiting TCP connections over port {}...",
                self.local_addr.port()
            );
            self.serve_one()?;
        }
    }

    pub fn serve_one(&mut self) -> Result<Iteration, TransferError> {
        self.shutdown.check()?;
        let accepted = match self.session.listener.as_ref() {
            Some(l) => accept(l),
            None => return Err(TransferError::Interrupted),
        };
        self.shutdown.check()?;
        let (stream, peer) = match accepted {
            Ok(s) => s,
            Err(e) => {
                error!("server: ERROR: {}", e);
                return Ok(Iteration::Dropped(e));
            }
        };
        info!("server: Connection accepted from {}!", peer);
        self.shutdown.arm_stream(&stream);
        self.session.conn = Some(stream);
        // a trigger that landed between accept and arming had nothing to wake
        self.shutdown.check()?;

        let outcome = self.receive_and_save();
        self.session.close_iteration();
        self.shutdown.disarm_stream();
        self.shutdown.check()?;

        match outcome {
            Ok(saved) => {
                self.next_index = self.next_index.saturating_add(1);
                Ok(saved)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("server: ERROR: {}", e);
                Ok(Iteration::Dropped(e))
            }
        }
    }

    fn receive_and_save(&mut self) -> Result<Iteration, TransferError> {
        let buf = match self.session.buffer.as_mut() {
            Some(b) => b.as_mut_slice(),
            None => return Err(TransferError::BufferReleased),
        };
        let conn = match self.session.conn.as_mut() {
            Some(c) => c,
            None => return Err(TransferError::Interrupted),
        };

        info!("server: Receiving file...");
        let received = receive_until_closed(conn, buf)?;
        self.shutdown.check()?;
        info!("server: Connection closed.");

        let path = self.out_dir.join(output_name(self.next_index));
        info!("server: Saving file: {:?}...", path);
        let file = self.session.file.insert(create_output(&path)?);

        let written = write_payload(file, &buf[..received]);
        if written != received {
            error!(
                "server: ERROR: {}",
                TransferError::Write {
                    path: path.clone(),
                    written,
                    expected: received,
                }
            );
        } else {
            info!(
                "server: Done. ({} bytes, sha256 {})",
                received,
                payload_digest(&buf[..received])
            );
        }
        Ok(Iteration::Saved {
            path,
            received,
            written,
        })
    }

    pub fn release(&mut self) {
        self.session.release();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn buffer_has_requested_capacity() {
        let mut buf = TransferBuffer::new(4096).unwrap();
        assert_eq!(buf.capacity(), 4096);
        assert_eq!(buf.as_mut_slice().len(), 4096);
    }

    #[test]
    fn impossible_buffer_is_an_alloc_error() {
        assert!(matches!(TransferBuffer::new(usize::MAX), Err(TransferError::Alloc(_))));
    }

    #[test]
    fn invalid_host_is_fatal_and_nothing_leaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"abc").unwrap();

        let mut client = Client::new("not-an-ip", 4000, 64, ShutdownSignal::new()).unwrap();
        let err = client.send_file(&path).unwrap_err();
        assert!(matches!(err, TransferError::InvalidAddress(_)));
        assert!(err.is_fatal());
        assert!(client.session().conn.is_none());
        client.release();
        assert!(client.session().is_released());
    }

    #[test]
    fn refused_connection_is_fatal() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut client = Client::new("127.0.0.1", port, 64, ShutdownSignal::new()).unwrap();
        let err = client.send_all(&["whatever.txt"]).unwrap_err();
        assert!(matches!(err, TransferError::Connect { .. }));
    }

    #[test]
    fn interrupted_server_stops_before_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let signal = ShutdownSignal::new();
        let mut server = Server::bind(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            dir.path(),
            64,
            signal.clone(),
        )
        .unwrap();
        signal.trigger();
        assert!(matches!(server.serve(), Err(TransferError::Interrupted)));
        server.release();
        assert!(server.session().is_released());
        server.release();
    }

    #[test]
    fn released_server_refuses_to_serve() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            dir.path(),
            64,
            ShutdownSignal::new(),
        )
        .unwrap();
        server.release();
        assert!(server.serve_one().unwrap_err().is_fatal());
    }

    #[test]
    fn bind_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = match taken.local_addr().unwrap() {
            SocketAddr::V4(a) => a,
            SocketAddr::V6(_) => unreachable!(),
        };
        let res = Server::bind(addr, dir.path(), 64, ShutdownSignal::new());
        assert!(matches!(res, Err(TransferError::Bind { .. })));
    }
}
