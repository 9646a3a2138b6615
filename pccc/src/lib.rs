pub mod client;
pub mod codec;
pub mod msg;
pub mod pool;
pub mod status;

pub use client::PcccConnection;
pub use msg::{Command, Outcome};
pub use status::Status;
