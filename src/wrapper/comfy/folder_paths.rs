//! 宿主 folder_paths 模块封装
//!
//! LoRA 清单由 ComfyUI 的 folder_paths 提供, 每次请求取最新快照,
//! 本 crate 不做缓存

use log::warn;
use pyo3::{
    types::{PyAnyMethods, PyModule},
    PyResult, Python,
};

/// 获取指定模型目录下的文件名列表
///
/// 保持 folder_paths 返回的迭代顺序
pub fn get_filename_list(py: Python, folder_name: &str) -> PyResult<Vec<String>> {
    PyModule::import(py, "folder_paths")?
        .getattr("get_filename_list")?
        .call1((folder_name,))?
        .extract::<Vec<String>>()
}

/// 获取指定模型目录下的文件名列表, 失败时降级为空清单
pub fn get_filename_list_or_empty(py: Python, folder_name: &str) -> Vec<String> {
    match get_filename_list(py, folder_name) {
        Ok(list) => list,
        Err(e) => {
            warn!("get_filename_list({folder_name}) failed, {e}");
            Vec::new()
        }
    }
}
