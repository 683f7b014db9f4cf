pub mod utils;
pub mod svm;
pub mod pipeline;
pub mod config;
pub mod errors;
pub mod helper;
pub mod modules;
