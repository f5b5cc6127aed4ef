//! YAML LoRA 选择节点
//!
//! 输出带扩展名的 LoRA 文件名与权重, 与 WanVideo Lora Select 的输出形式兼容

use log::{error, info, warn};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyType},
    Bound, Py, PyErr, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_LOADERS,
        lora::{parse_lora_reference, resolve_lora_file, LoraResolution},
        settings::{peek_category_keys, SettingsCache, DEFAULT_SETTINGS_FILE},
    },
    error::Error,
    wrapper::{
        comfy::folder_paths,
        comfyui::{
            types::{NODE_FLOAT, NODE_STRING},
            PromptServer,
        },
    },
};

/// YAML LoRA 选择节点
#[pyclass(subclass)]
pub struct YamlLoraSelector {
    settings: SettingsCache,
}

impl PromptServer for YamlLoraSelector {}

#[pymethods]
impl YamlLoraSelector {
    #[new]
    fn new() -> Self {
        Self {
            settings: SettingsCache::new(),
        }
    }

    // 返回参数类型
    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
    ) {
        (
            NODE_STRING,
            NODE_FLOAT,
            NODE_STRING,
            NODE_FLOAT,
            NODE_STRING,
            NODE_FLOAT,
        )
    }

    // 返回参数名称
    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
    ) {
        (
            "lora1",
            "strength1",
            "lora2",
            "strength2",
            "lora3",
            "strength3",
        )
    }

    // 节点分类
    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADERS;

    // 节点描述
    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Resolve lora references from the YAML settings to available lora filenames with strengths."
    }

    // 调用方法函数名称
    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    /// 使用 #[classmethod] 实现 INPUT_TYPES
    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "yaml_path",
                    (NODE_STRING, {
                        let yaml_path = PyDict::new(py);
                        yaml_path.set_item("default", DEFAULT_SETTINGS_FILE)?;
                        yaml_path.set_item("tooltip", "Path of the YAML settings file")?;
                        yaml_path
                    }),
                )?;

                let keys = peek_category_keys(DEFAULT_SETTINGS_FILE);
                if keys.is_empty() {
                    required.set_item("category", (NODE_STRING,))?;
                } else {
                    required.set_item("category", (keys,))?;
                }

                required
            })?;
            Ok(dict.into())
        })
    }

    #[allow(clippy::type_complexity)]
    #[pyo3(name = "execute")]
    fn execute(
        &mut self,
        py: Python,
        yaml_path: String,
        category: String,
    ) -> PyResult<(String, f32, String, f32, String, f32)> {
        let results = self.select(py, &yaml_path, &category);

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("YamlLoraSelector error, {e}");
                if let Err(e) = self.send_error(py, "YamlLoraSelector".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl YamlLoraSelector {
    /// 选择主流程
    #[allow(clippy::type_complexity)]
    fn select(
        &mut self,
        py: Python,
        yaml_path: &str,
        category: &str,
    ) -> Result<(String, f32, String, f32, String, f32), Error> {
        let settings = self.settings.load(yaml_path)?;
        let config = settings.category(category)?;

        // 带扩展名的清单, 每次请求取最新快照
        let inventory = folder_paths::get_filename_list_or_empty(py, "loras");

        let (file1, weight1) = self.resolve_slot(&config.lora1, &inventory);
        let (file2, weight2) = self.resolve_slot(&config.lora2, &inventory);
        let (file3, weight3) = self.resolve_slot(&config.lora3, &inventory);

        info!(
            "YamlLoraSelector category: {category}, \
             lora1: {file1} ({weight1}), lora2: {file2} ({weight2}), lora3: {file3} ({weight3})"
        );

        Ok((file1, weight1, file2, weight2, file3, weight3))
    }

    /// 单个 LoRA 槽位的文件解析
    ///
    /// 未命中不是错误, 退化为空文件名
    fn resolve_slot(&self, raw: &str, inventory: &[String]) -> (String, f32) {
        let lora = parse_lora_reference(raw);
        if lora.name.is_empty() {
            return (String::new(), lora.weight);
        }

        let file = match resolve_lora_file(&lora.name, inventory) {
            LoraResolution::Exact(entry) => entry,
            LoraResolution::CaseCorrected(entry) => {
                warn!("YamlLoraSelector lora file matched with case correction: {} -> {entry}", lora.name);
                entry
            }
            LoraResolution::NotFound => {
                warn!("YamlLoraSelector no lora file found for '{}'", lora.name);
                String::new()
            }
        };

        (file, lora.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> YamlLoraSelector {
        YamlLoraSelector {
            settings: SettingsCache::new(),
        }
    }

    fn inventory(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_resolve_slot_exact_file() {
        let inv = inventory(&["char1.safetensors", "style_b.ckpt"]);
        let (file, weight) = node().resolve_slot("<lora:char1:0.8>", &inv);
        assert_eq!(file, "char1.safetensors");
        assert_eq!(weight, 0.8);
    }

    #[test]
    fn test_resolve_slot_case_corrected() {
        let inv = inventory(&["Char1.safetensors"]);
        let (file, weight) = node().resolve_slot("char1", &inv);
        assert_eq!(file, "Char1.safetensors");
        assert_eq!(weight, 1.0);
    }

    #[test]
    fn test_resolve_slot_missing_degrades_to_empty() {
        let inv = inventory(&["char1.safetensors"]);
        let (file, weight) = node().resolve_slot("<lora:missing:0.5>", &inv);
        assert_eq!(file, "");
        assert_eq!(weight, 0.5);
    }

    #[test]
    fn test_resolve_slot_empty_reference() {
        let (file, weight) = node().resolve_slot("", &inventory(&["char1.safetensors"]));
        assert_eq!(file, "");
        assert_eq!(weight, 1.0);
    }
}
