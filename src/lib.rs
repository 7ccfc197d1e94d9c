pub mod aggregator;
pub mod config;
pub mod database_ops;
pub mod models;
pub mod normalization;
pub mod notify;
pub mod orchestrator;
pub mod runner;
pub mod shift;
pub mod sources;
pub mod summary;
pub mod tracing;

pub mod util {
    pub mod env;
    pub mod html;
}

#[cfg(test)]
pub(crate) mod testing;

/// Printed once, the first time the tool runs against a fresh key database.
pub const FIRST_RUN_NOTICE: &str = "\
autoshift  Redeem SHiFT codes automatically.
This program comes with ABSOLUTELY NO WARRANTY.
It is free software, and you are welcome to redistribute it under the terms
of the GNU General Public License, version 3 or later.
";
