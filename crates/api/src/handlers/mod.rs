pub mod batch;
pub mod downloads;
pub mod settings;
