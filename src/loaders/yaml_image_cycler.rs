//! 分类图像巡回节点 (完整版)
//!
//! 每次执行返回分类文件夹中的下一张图像,
//! 连同 YAML 中配置的 prompt / lora1-3 原始字符串

use std::path::Path;

use candle_core::Device;
use log::{error, info};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_LOADERS,
        cycler::{list_image_files, ImageCursor},
        settings::{peek_category_keys, SettingsCache, DEFAULT_SETTINGS_FILE},
        utils::image::image_to_tensor,
    },
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_IMAGE, NODE_STRING},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 分类图像巡回节点 (完整版)
#[pyclass(subclass)]
pub struct YamlImageCycler {
    device: Device,
    cursor: ImageCursor,
    settings: SettingsCache,
}

impl PromptServer for YamlImageCycler {}

#[pymethods]
impl YamlImageCycler {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
            cursor: ImageCursor::new(),
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
    ) {
        (
            NODE_IMAGE,
            NODE_STRING,
            NODE_STRING,
            NODE_STRING,
            NODE_STRING,
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
    ) {
        ("image", "prompt", "lora1", "lora2", "lora3")
    }

    // 节点分类
    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADERS;

    // 节点描述
    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Cycle through a category's images while returning the prompt / lora strings from the YAML settings."
    }

    // 调用方法函数名称
    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    /// 使用 #[classmethod] 实现 INPUT_TYPES
    ///
    /// category 优先用默认配置文件的顶层 key 做下拉框,
    /// 读取失败时降级为手工输入
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
                required.set_item(
                    "parent_dir",
                    (NODE_STRING, {
                        let parent_dir = PyDict::new(py);
                        parent_dir.set_item("default", "./data")?;
                        parent_dir.set_item("tooltip", "Parent folder of the category folders")?;
                        parent_dir
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

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        yaml_path: String,
        parent_dir: String,
        category: String,
    ) -> PyResult<(Bound<'py, PyAny>, String, String, String, String)> {
        let results = self.cycle(py, &yaml_path, &parent_dir, &category);

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("YamlImageCycler error, {e}");
                if let Err(e) = self.send_error(py, "YamlImageCycler".to_string(), e.to_string()) {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl YamlImageCycler {
    /// 巡回主流程
    fn cycle<'py>(
        &mut self,
        py: Python<'py>,
        yaml_path: &str,
        parent_dir: &str,
        category: &str,
    ) -> Result<(Bound<'py, PyAny>, String, String, String, String), Error> {
        let settings = self.settings.load(yaml_path)?;
        let config = settings.category(category)?;

        // 图像文件夹: parent_dir/category, 每次调用重新扫描
        let cat_folder = Path::new(parent_dir).join(category);
        let images = list_image_files(&cat_folder)?;

        let (current_idx, filename) = self.cursor.advance(category, &images)?;

        let image_path = cat_folder.join(&filename);
        let image_tensor = self.load_image_tensor(py, &image_path)?;

        info!(
            "YamlImageCycler category: {category}, image: {filename} ({}/{})",
            current_idx + 1,
            images.len()
        );

        Ok((
            image_tensor,
            config.prompt.clone(),
            config.lora1.clone(),
            config.lora2.clone(),
            config.lora3.clone(),
        ))
    }

    /// 读取图像并转换为 ComfyUI IMAGE 张量
    fn load_image_tensor<'py>(
        &self,
        py: Python<'py>,
        path: &Path,
    ) -> Result<Bound<'py, PyAny>, Error> {
        if !path.is_file() {
            return Err(Error::ImageNotFound(path.to_string_lossy().to_string()));
        }

        let img = image::open(path)?;

        // HWC -> NHWC
        let tensor = image_to_tensor(&img, &self.device)?.unsqueeze(0)?;

        let tensor_wrapper: TensorWrapper<f32> = tensor.into();
        tensor_wrapper.to_py_tensor(py).map_err(Error::PyErr)
    }
}
