pub mod convert;
pub mod routes;
pub mod segments;

pub use convert::run as convert;
pub use routes::diagnose as diagnose_routes;
pub use segments::{clean, merge};
