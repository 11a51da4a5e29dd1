pub mod application;
pub mod model;
pub mod style;
pub mod types;
