pub mod optimization;
pub mod scaling;
