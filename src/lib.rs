//! AutoML: command-line front end over `automl-core`
//!
//! Uploads datasets, trains and evaluates pipelines, saves them to the
//! artifact store and runs saved pipelines over new CSV files.

pub mod cli;
pub mod logging;
