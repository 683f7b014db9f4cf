pub mod model;
pub mod trainer;
