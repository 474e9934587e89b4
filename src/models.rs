pub mod artifact;
pub mod catalog;
pub mod item;
pub mod material;
pub mod stats;
pub mod types;
