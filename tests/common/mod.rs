//! Shared test utilities for relay integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Fakes bind 127.0.0.1 on a random port, so harnesses can
//! run in parallel.

pub mod assertions;
pub mod builders;
pub mod fake_upstream;
pub mod fake_whois;
pub mod fixtures;

pub use builders::*;
pub use fake_upstream::*;
pub use fake_whois::*;
pub use fixtures::*;
