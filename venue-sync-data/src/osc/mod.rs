//! Streaming classifier for osmChange documents.
//!
//! A diff is a sequence of `create`, `modify`, and `delete` sections, each
//! holding `node`, `way`, and `relation` elements with `tag` children. The
//! classifier keeps only what the venue snapshot needs and routes every
//! entity through the domain rules in `venue-sync-core`.
#![forbid(unsafe_code)]

mod error;
mod parser;

pub use error::ClassifyError;
pub use parser::{classify, classify_file};

#[cfg(test)]
mod tests;
