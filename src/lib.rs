pub mod config;
pub mod db;
pub mod error;
pub mod import_catalog;
pub mod models;
pub mod net;
pub mod services;
pub mod state;
pub mod util;

// Convenient re-exports (so call sites can do `mystica::Registry`, etc.)
pub use state::registry::Registry;
