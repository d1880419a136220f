pub mod device_cache;
pub mod models;
pub mod names;
pub mod settings;
