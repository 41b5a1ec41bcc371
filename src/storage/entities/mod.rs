//! Database entity models

pub mod connection;
pub mod default_connection;
pub mod message;
pub mod session;
pub mod summary;

/// A user-owned conversation thread
pub type Session = session::Model;
/// One stored conversation message
pub type Message = message::Model;
/// Generated stand-in for a contiguous prefix of a session
pub type Summary = summary::Model;
/// A user-owned, named provider binding
pub type Connection = connection::Model;
