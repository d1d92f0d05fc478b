pub mod engine;
pub mod error;
pub mod job;
pub mod segment;
pub mod settings;
