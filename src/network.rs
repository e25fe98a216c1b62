extern crate net2;

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};

use net2::TcpBuilder;

use crate::error::TransferError;

pub const LISTEN_BACKLOG: i32 = 32;

pub fn new_socket() -> Result<TcpBuilder, TransferError> {
    match TcpBuilder::new_v4() {
        Ok(s) => Ok(s),
        Err(m) => Err(TransferError::Socket(m)),
    }
}

pub fn parse_ipv4(host: &str) -> Result<Ipv4Addr, TransferError> {
    match host.parse::<Ipv4Addr>() {
        Ok(a) => Ok(a),
        Err(_) => Err(TransferError::InvalidAddress(host.to_string())),
    }
}

/// One blocking connect attempt, no retries.
pub fn connect(builder: &TcpBuilder, addr: SocketAddrV4) -> Result<TcpStream, TransferError> {
    match builder.connect(addr) {
        Ok(s) => Ok(s),
        Err(m) => Err(TransferError::Connect {
            addr: SocketAddr::V4(addr),
            source: m,
        }),
    }
}

pub fn build_listener(addr: SocketAddrV4) -> Result<TcpListener, TransferError> {
    let builder = new_socket()?;
    if let Err(m) = builder.reuse_address(true) {
        return Err(TransferError::SocketOption(m));
    }
    if let Err(m) = builder.bind(addr) {
        return Err(TransferError::Bind {
            addr: SocketAddr::V4(addr),
            source: m,
        });
    }
    match builder.listen(LISTEN_BACKLOG) {
        Ok(l) => Ok(l),
        Err(m) => Err(TransferError::Listen(m)),
    }
}

pub fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), TransferError> {
    match listener.accept() {
        Ok(s) => Ok(s),
        Err(m) => Err(TransferError::Accept(m)),
    }
}

/// Reads until `buf` is full or the peer closes its side.
///
/// An error before anything arrived is a receive error. An error after some
/// bytes arrived ends the receive with what was collected so far.
pub fn receive_until_closed<R: Read>(
    stream: &mut R,
    buf: &mut [u8],
) -> Result<usize, TransferError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if filled == 0 => return Err(TransferError::Receive(e)),
            Err(e) => {
                tracing::warn!("receive cut short after {} bytes: {}", filled, e);
                break;
            }
        }
    }
    Ok(filled)
}

/// Sends `bytes` and returns how many actually went out.
pub fn send_payload<W: Write>(stream: &mut W, bytes: &[u8]) -> usize {
    let mut sent = 0;
    while sent < bytes.len() {
        match stream.write(&bytes[sent..]) {
            Ok(0) => break,
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("send stopped after {} bytes: {}", sent, e);
                break;
            }
        }
    }
    sent
}
