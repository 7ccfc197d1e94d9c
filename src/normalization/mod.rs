pub mod game;
pub mod platform;
