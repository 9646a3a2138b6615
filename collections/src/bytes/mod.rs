mod bytes;
mod rc;
mod slice;

pub use bytes::Bytes;
pub use slice::Slice;
