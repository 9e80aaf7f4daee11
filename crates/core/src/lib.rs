//! Domain types shared by every autotune crate.
//!
//! Nothing in here performs I/O: profiles, job requests, naming
//! conventions and the recommendations-log parser are all pure so they
//! can be exercised directly from unit tests.

pub mod env;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod profile;
pub mod recommendations;
pub mod request;
pub mod types;
