//! Core library for the swap-cycler bot.
//!
//! The binary (`main.rs`) wires a wallet session and router client into a
//! [`scheduler::BotScheduler`]; everything it drives lives here so the loop
//! can be exercised against the doubles in [`mocks`].

pub mod config;
pub mod dex;
pub mod errors;
pub mod executor;
pub mod history;
pub mod mocks;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod strategy;
pub mod utils;
