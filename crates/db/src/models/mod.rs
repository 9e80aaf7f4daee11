//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row plus the input DTOs its repository accepts.

pub mod job;
pub mod setting;
