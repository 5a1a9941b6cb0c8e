pub mod assets;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod devserver;
pub mod dispatch;
pub mod docx;
pub mod error;
pub mod exec;
pub mod preview;
pub mod protocol;
pub mod resolve;
pub mod session;
pub mod tree;
