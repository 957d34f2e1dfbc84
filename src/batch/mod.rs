mod builder;
mod command;
mod document;
mod error;
mod process;
mod runner;
mod symbols;

pub use builder::BatchBuilder;
pub use document::{parse_document, read_document};
pub use error::BatchError;
pub use runner::FailurePolicy;
