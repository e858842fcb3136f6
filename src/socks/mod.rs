//! SOCKS5 service module for Sshgate
//!
//! Terminates the SOCKS5 protocol on a local listener and opens every
//! requested target through the SSH session. Only CONNECT with "no
//! authentication" is implemented.

mod auth;
mod command;
mod consts;
mod handler;
mod server;
mod types;

pub use auth::negotiate;
pub use command::{build_reply, parse_request, send_reply};
pub use consts::*;
pub use handler::handle_socks5_on_stream;
pub use server::{serve_connection, SocksServer};
pub use types::{SocksCommand, TargetAddr};
