//! Data structures representing format components.
//!
//! Contains MPEG audio frame headers, ID3 tag headers, Ogg page headers and
//! lacing, the issue model shared by all parsers, and the parse results they
//! produce.

pub mod frame;
pub mod issue;
pub mod page;
pub mod stream;
pub mod tag;
