//! Utility functions and supporting infrastructure.
//!
//! Provides the counting reader, CRC validation, error types and exact
//! duration arithmetic shared by the frame and page parsers.

pub mod crc;
pub mod errors;
pub mod reader;
pub mod timing;
