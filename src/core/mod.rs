//! 公共库

pub mod category;
pub mod cycler;
pub mod lora;
pub mod node;
pub mod settings;
pub mod utils;
