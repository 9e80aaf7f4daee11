//! Job lifecycle.
//!
//! [`submission`] records a request and dispatches it to storage and the
//! batch scheduler. [`completion`] handles the callback made by the job's
//! upload task once the computation has finished, and [`notifier`] turns
//! its outcome into the results email.

pub mod completion;
pub mod notifier;
pub mod submission;
