pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod routes;
pub mod storage;

pub use error::{EtlError, Result};
