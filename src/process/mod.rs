/// Backend process ownership and teardown
/// The launcher owns exactly one backend; this module makes sure that when it
/// goes away, the interpreter and everything it started go with it.

pub mod handle;
pub mod signal;

pub use handle::{BackendProcess, TerminationOutcome};
