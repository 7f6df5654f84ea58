pub mod access;
pub mod config;
pub mod errors;
pub mod github;
pub mod notify;
pub mod remote;
pub mod revision;
pub mod server;
pub mod status;
