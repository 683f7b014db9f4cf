pub mod coordinate;
pub mod utils;
