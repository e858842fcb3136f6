//! SOCKS5 request handling module
//!
//! Parses SOCKS5 requests and builds replies.

mod parser;
mod reply;

pub use parser::parse_request;
pub use reply::{
    build_reply, send_command_not_supported, send_general_failure, send_reply, send_success,
};
