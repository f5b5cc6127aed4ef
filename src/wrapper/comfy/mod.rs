//! ComfyUI 宿主环境封装

pub mod folder_paths;
