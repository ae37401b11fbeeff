//! This file is the root of the `timbang` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`scorer`,
//!     `container`, `engine`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types a host application needs to
//!     configure, run, save, and reload a model-scoring transform.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod schema;
pub mod scorer;
pub mod shape;
pub mod types;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use config::{InputColumn, ScorerOptions};
pub use container::{ContainerInfo, ContainerKind, ModelContainer};
pub use engine::ComputeEngine;
pub use error::TimbangError;
pub use scorer::{ModelScorer, RowMapper};

use std::fs::OpenOptions;
use std::sync::Once;

use log::LevelFilter;

static INIT_LOGGER: Once = Once::new();

/// Turns on verbose logging for shape reconciliation and the scoring loop.
/// Safe to call more than once; only the first call takes effect. When
/// `log_file` is given, output is appended there instead of stderr.
pub fn enable_verbose_logging(log_file: Option<String>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Debug);

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = log_file {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(filename)
                .expect("Could not open log file in append mode");
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
}
