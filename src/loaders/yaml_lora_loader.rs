//! YAML LoRA 加载节点
//!
//! 输出去扩展名的 LoRA 名称, 并在可用清单中校验;
//! 下拉框 override 与 raw 模式跳过校验

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
        lora::{
            parse_lora_reference, resolve_lora_name, strip_extension, LoraResolution, ResolveMode,
        },
        settings::{peek_category_keys, SettingsCache, DEFAULT_SETTINGS_FILE},
    },
    error::Error,
    wrapper::{
        comfy::folder_paths,
        comfyui::{types::NODE_STRING, PromptServer},
    },
};

/// override 下拉框的空选项
const OVERRIDE_NONE: &str = "None";

/// YAML LoRA 加载节点
#[pyclass(subclass)]
pub struct YamlLoraLoader {
    settings: SettingsCache,
}

impl PromptServer for YamlLoraLoader {}

#[pymethods]
impl YamlLoraLoader {
    #[new]
    fn new() -> Self {
        Self {
            settings: SettingsCache::new(),
        }
    }

    // 返回参数类型
    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str) {
        (NODE_STRING, NODE_STRING, NODE_STRING, NODE_STRING)
    }

    // 返回参数名称
    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str) {
        ("prompt", "lora1", "lora2", "lora3")
    }

    // 节点分类
    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADERS;

    // 节点描述
    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Load lora names from the YAML settings, validated against the available lora list."
    }

    // 调用方法函数名称
    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    /// 使用 #[classmethod] 实现 INPUT_TYPES
    ///
    /// override 下拉框用去扩展名的 LoRA 清单, 清单获取失败时只有 None 选项
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

            dict.set_item("optional", {
                let optional = PyDict::new(py);

                let mut lora_names = vec![OVERRIDE_NONE.to_string()];
                lora_names.extend(
                    folder_paths::get_filename_list_or_empty(py, "loras")
                        .iter()
                        .map(|name| strip_extension(name).to_string()),
                );

                for input_name in ["lora1_override", "lora2_override", "lora3_override"] {
                    optional.set_item(
                        input_name,
                        (lora_names.clone(), {
                            let override_opts = PyDict::new(py);
                            override_opts.set_item("default", OVERRIDE_NONE)?;
                            override_opts
                        }),
                    )?;
                }

                optional.set_item(
                    "resolve_mode",
                    (
                        vec![
                            ResolveMode::Validate.to_string(),
                            ResolveMode::Raw.to_string(),
                        ],
                        {
                            let resolve_mode = PyDict::new(py);
                            resolve_mode.set_item("default", ResolveMode::Validate.to_string())?;
                            resolve_mode.set_item(
                                "tooltip",
                                "validate: match names against the lora list; raw: return names unchanged",
                            )?;
                            resolve_mode
                        },
                    ),
                )?;

                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    #[pyo3(signature = (
        yaml_path,
        category,
        lora1_override = OVERRIDE_NONE.to_string(),
        lora2_override = OVERRIDE_NONE.to_string(),
        lora3_override = OVERRIDE_NONE.to_string(),
        resolve_mode = ResolveMode::Validate.to_string()
    ))]
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        py: Python,
        yaml_path: String,
        category: String,
        lora1_override: String,
        lora2_override: String,
        lora3_override: String,
        resolve_mode: String,
    ) -> PyResult<(String, String, String, String)> {
        let results = self.load(
            py,
            &yaml_path,
            &category,
            [&lora1_override, &lora2_override, &lora3_override],
            &resolve_mode,
        );

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("YamlLoraLoader error, {e}");
                if let Err(e) = self.send_error(py, "YamlLoraLoader".to_string(), e.to_string()) {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl YamlLoraLoader {
    /// 加载主流程
    fn load(
        &mut self,
        py: Python,
        yaml_path: &str,
        category: &str,
        overrides: [&str; 3],
        resolve_mode: &str,
    ) -> Result<(String, String, String, String), Error> {
        let mode = ResolveMode::parse(resolve_mode)?;

        let settings = self.settings.load(yaml_path)?;
        let config = settings.category(category)?;

        // 去扩展名的清单, 每次请求取最新快照
        let inventory: Vec<String> = folder_paths::get_filename_list_or_empty(py, "loras")
            .iter()
            .map(|name| strip_extension(name).to_string())
            .collect();

        let lora1 = self.resolve_slot(&config.lora1, overrides[0], mode, &inventory);
        let lora2 = self.resolve_slot(&config.lora2, overrides[1], mode, &inventory);
        let lora3 = self.resolve_slot(&config.lora3, overrides[2], mode, &inventory);

        info!(
            "YamlLoraLoader category: {category}, lora1: {lora1}, lora2: {lora2}, lora3: {lora3}"
        );

        Ok((config.prompt.clone(), lora1, lora2, lora3))
    }

    /// 单个 LoRA 槽位的名称解析
    ///
    /// override 优先且不校验; validate 模式下未命中退化为 None 哨兵
    fn resolve_slot(
        &self,
        raw: &str,
        override_name: &str,
        mode: ResolveMode,
        inventory: &[String],
    ) -> String {
        if override_name != OVERRIDE_NONE {
            return override_name.to_string();
        }

        let name = parse_lora_reference(raw).name;
        match mode {
            ResolveMode::Raw => name,
            ResolveMode::Validate => {
                if name.is_empty() {
                    return OVERRIDE_NONE.to_string();
                }
                match resolve_lora_name(&name, inventory) {
                    LoraResolution::Exact(entry) => entry,
                    LoraResolution::CaseCorrected(entry) => {
                        warn!("YamlLoraLoader lora name corrected: {name} -> {entry}");
                        entry
                    }
                    LoraResolution::NotFound => {
                        warn!("YamlLoraLoader lora '{name}' not found in the available list");
                        OVERRIDE_NONE.to_string()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> YamlLoraLoader {
        YamlLoraLoader {
            settings: SettingsCache::new(),
        }
    }

    fn inventory(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_resolve_slot_override_wins() {
        let resolved = node().resolve_slot(
            "<lora:char1:0.7>",
            "other_lora",
            ResolveMode::Validate,
            &inventory(&["char1"]),
        );
        assert_eq!(resolved, "other_lora");
    }

    #[test]
    fn test_resolve_slot_validate() {
        let inv = inventory(&["Char1", "style_b"]);

        // 大小写纠正
        let resolved =
            node().resolve_slot("<lora:char1:0.7>", OVERRIDE_NONE, ResolveMode::Validate, &inv);
        assert_eq!(resolved, "Char1");

        // 未命中退化为 None
        let resolved = node().resolve_slot("missing", OVERRIDE_NONE, ResolveMode::Validate, &inv);
        assert_eq!(resolved, OVERRIDE_NONE);

        // 空引用退化为 None
        let resolved = node().resolve_slot("", OVERRIDE_NONE, ResolveMode::Validate, &inv);
        assert_eq!(resolved, OVERRIDE_NONE);
    }

    #[test]
    fn test_resolve_slot_validate_dotted_name() {
        // 清单已去扩展名, 名称里的点号不能被当成扩展名截掉
        let inv = inventory(&["MyLora-v1.0"]);
        let resolved = node().resolve_slot(
            "<lora:MyLora-v1.0:0.8>",
            OVERRIDE_NONE,
            ResolveMode::Validate,
            &inv,
        );
        assert_eq!(resolved, "MyLora-v1.0");
    }

    #[test]
    fn test_resolve_slot_raw_passthrough() {
        let resolved = node().resolve_slot(
            "<lora:missing:0.7>",
            OVERRIDE_NONE,
            ResolveMode::Raw,
            &inventory(&["char1"]),
        );
        assert_eq!(resolved, "missing");
    }
}
