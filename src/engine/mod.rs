pub mod effects;
pub mod matcher;
