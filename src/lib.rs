pub mod engine;
pub mod errors;
pub mod events;
pub mod models;
pub mod params;
pub mod providers;
pub mod registry;
