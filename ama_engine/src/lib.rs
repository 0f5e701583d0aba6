pub mod backtest;
pub mod config;
pub mod data;
pub mod engine;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod risk;
pub mod session;
pub mod strategy;
pub mod trailing;

pub use models::*;
