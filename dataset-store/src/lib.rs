//! Durable state on disk: one posts file per hashtag and the media directory
//! next to it.

pub mod manifest;
pub mod records;

pub use manifest::*;
pub use records::*;

mod tests;
