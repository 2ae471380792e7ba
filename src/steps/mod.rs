//! Step providers
//!
//! Concrete [`declarative::Step`] implementations built from the step file.

pub mod shell;

pub use shell::ShellStep;
