mod protocol;

pub use protocol::DEFAULT_PORT;
