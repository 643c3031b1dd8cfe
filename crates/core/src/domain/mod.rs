pub mod committee;
pub mod material;
pub mod phase;
pub mod repair;
pub mod withdrawal;
