/************************************************************
 ************The Raw Direct File Transfer Protocol***********
 ***********************************************************
 ******one connection per file, no header, no trailer,******
 *********the peer closing the socket ends the file*********
 **********************************************************/

pub mod cmd;
pub mod error;
pub mod files;
pub mod guardian;
pub mod logging;
pub mod network;
pub mod protocol;

pub use crate::error::TransferError;
pub use crate::guardian::{Session, ShutdownSignal};
pub use crate::protocol::{
    Client, Delivery, Iteration, Report, Server, TransferBuffer, TRANSFER_BUFF_SIZE,
};
