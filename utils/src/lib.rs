/// Utilities for reading and writing integers in a fixed byteorder.
pub mod endian;
/// Error-handling utilities.
pub mod error;
