//! CSV operation scripts: reading them, running them against the
//! controller and summarizing the result.

pub mod operation_reader;
pub mod script_runner;
pub mod summary_writer;
