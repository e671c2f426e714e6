pub mod archive;
pub mod config;
pub mod duck;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod process;
