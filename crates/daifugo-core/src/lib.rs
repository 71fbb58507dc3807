pub mod bot;
pub mod cards;
pub mod engine;
pub mod protocol;
