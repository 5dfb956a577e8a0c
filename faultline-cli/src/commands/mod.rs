//! Command handlers -- one module per subcommand

pub mod campaign;
pub mod config;
pub mod plan;
pub mod replay;
pub mod select;
pub mod trials;
