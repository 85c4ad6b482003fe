//! Command-line front end for uqcase studies
//!
//! - `config`: YAML study files (serde-saphyr, `deny_unknown_fields`)
//! - `commands`: the `sample`, `run`, `aggregate` and `template` subcommands
//! - `logging`: stderr plus a size-rotated `uqcase.log`

#![warn(clippy::all)]

pub mod commands;
pub mod config;
pub mod logging;
pub mod util;

pub use config::{ConfigError, SamplingOverrides, StudyFile};
pub use logging::init_logging;
