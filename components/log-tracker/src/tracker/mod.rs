pub mod errors;
pub mod models;
pub mod monitor;
pub mod reader;
pub mod source;
pub mod tracker;
