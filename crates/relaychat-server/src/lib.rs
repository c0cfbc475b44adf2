pub mod directory;
pub mod engine;
pub mod envelope;
pub mod gate;
pub mod registry;
pub mod service;
