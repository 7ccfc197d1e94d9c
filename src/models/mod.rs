pub mod catalog;
pub mod key;

pub use catalog::{Game, Platform};
pub use key::{golden_units, Key, PLACEHOLDER_REWARD};
