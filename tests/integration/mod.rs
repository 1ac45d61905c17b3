//! Integration test modules

pub mod common;

mod filter_session;
