// src/lib.rs
pub mod artifact;
pub mod clean;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod promote;
pub mod source;

#[cfg(test)]
mod test_support;
