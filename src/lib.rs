//! A personal Matrix sticker bot: collect images by reacting to them,
//! curate them into packs, and publish the packs as room emotes.

pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod matrix;
pub mod publish;
pub mod storage;
pub mod vision;
