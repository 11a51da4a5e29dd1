pub mod connection;
pub mod constants;
pub mod machine;
pub mod types;
