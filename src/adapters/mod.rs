//! Concrete adapter implementations for ports.

#[cfg(feature = "coinbase")]
pub mod coinbase_adapter;
pub mod chart_svg;
pub mod csv_adapter;
pub mod file_config_adapter;
