//! YAML LoRA 信息提取节点
//!
//! 只做解析, 不访问 LoRA 清单

use log::{error, info};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyType},
    Bound, Py, PyErr, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_LOADERS,
        lora::parse_lora_reference,
        settings::{peek_category_keys, SettingsCache, DEFAULT_SETTINGS_FILE},
    },
    error::Error,
    wrapper::comfyui::{
        types::{NODE_FLOAT, NODE_STRING},
        PromptServer,
    },
};

/// YAML LoRA 信息提取节点
#[pyclass(subclass)]
pub struct YamlLoraExtractor {
    settings: SettingsCache,
}

impl PromptServer for YamlLoraExtractor {}

#[pymethods]
impl YamlLoraExtractor {
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
        &'static str,
    ) {
        (
            NODE_STRING,
            NODE_STRING,
            NODE_STRING,
            NODE_STRING,
            NODE_FLOAT,
            NODE_FLOAT,
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
        &'static str,
    ) {
        (
            "prompt",
            "lora1_name",
            "lora2_name",
            "lora3_name",
            "lora1_weight",
            "lora2_weight",
            "lora3_weight",
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
        "Extract prompt and lora name/weight pairs from the YAML settings."
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
    ) -> PyResult<(String, String, String, String, f32, f32, f32)> {
        let results = self.extract(&yaml_path, &category);

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("YamlLoraExtractor error, {e}");
                if let Err(e) = self.send_error(py, "YamlLoraExtractor".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl YamlLoraExtractor {
    /// 提取主流程
    #[allow(clippy::type_complexity)]
    fn extract(
        &mut self,
        yaml_path: &str,
        category: &str,
    ) -> Result<(String, String, String, String, f32, f32, f32), Error> {
        let settings = self.settings.load(yaml_path)?;
        let config = settings.category(category)?;

        let lora1 = parse_lora_reference(&config.lora1);
        let lora2 = parse_lora_reference(&config.lora2);
        let lora3 = parse_lora_reference(&config.lora3);

        info!(
            "YamlLoraExtractor category: {category}, lora1: {} ({}), lora2: {} ({}), lora3: {} ({})",
            lora1.name, lora1.weight, lora2.name, lora2.weight, lora3.name, lora3.weight
        );

        Ok((
            config.prompt.clone(),
            lora1.name,
            lora2.name,
            lora3.name,
            lora1.weight,
            lora2.weight,
            lora3.weight,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_extract() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("setting.yaml");
        fs::write(
            &path,
            r#"
portrait:
  prompt: "a face"
  lora1: "<lora:char1:0.7>"
  lora2: "style_b"
"#,
        )?;

        let mut node = YamlLoraExtractor {
            settings: SettingsCache::new(),
        };
        let (prompt, name1, name2, name3, weight1, weight2, weight3) =
            node.extract(path.to_str().unwrap(), "portrait")?;

        assert_eq!(prompt, "a face");
        assert_eq!(name1, "char1");
        assert_eq!(weight1, 0.7);
        assert_eq!(name2, "style_b");
        assert_eq!(weight2, 1.0);
        assert_eq!(name3, "");
        assert_eq!(weight3, 1.0);

        Ok(())
    }
}
