//! Plugins shipped with the server.

pub mod rfid;
pub mod surprise;
