pub mod canonical;
pub mod weighted;
