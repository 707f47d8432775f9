//! Interactive channels other than HTTP.

pub mod cli;

pub use cli::run_survey;
