pub mod config;
pub mod keyboard;
pub mod messages;
pub mod motion;
pub mod motor;
pub mod runtime;
