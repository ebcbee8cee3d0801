//! Isolated render environments.
//!
//! [`session`] defines the contract; [`process`] implements it with one OS process per job.

pub mod process;
pub mod session;
