pub mod bridge;
pub mod config;
pub mod error;
pub mod inode;
pub mod multiplexer;
pub mod reader;
pub mod transport;
pub mod wire;
