//! ComfyUI / Python 侧交互封装

pub mod comfy;
pub mod comfyui;
pub mod torch;
