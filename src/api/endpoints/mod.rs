//! API endpoint handlers.
//!
//! Handlers parse the request, then hand the work to the intake, charting
//! and report modules on the blocking pool.

pub mod cases;
pub mod health;
pub mod patients;
