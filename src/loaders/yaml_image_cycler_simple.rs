//! 分类图像巡回节点 (简化版)
//!
//! 每次执行返回分类文件夹中的下一张图像及其对应的 mask,
//! 找不到 mask 时合成一张全零 mask

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
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
        utils::image::{image_to_tensor, mask_to_tensor, zero_mask},
    },
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_IMAGE, NODE_MASK, NODE_STRING},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

// mask 文件扩展名
const MASK_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// 分类图像巡回节点 (简化版)
#[pyclass(subclass)]
pub struct YamlImageCyclerSimple {
    device: Device,
    cursor: ImageCursor,
    settings: SettingsCache,
}

impl PromptServer for YamlImageCyclerSimple {}

#[pymethods]
impl YamlImageCyclerSimple {
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
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str) {
        (NODE_IMAGE, NODE_MASK, NODE_STRING, NODE_STRING)
    }

    // 返回参数名称
    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str) {
        ("image", "mask", "category", "yaml_path")
    }

    // 节点分类
    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADERS;

    // 节点描述
    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Cycle through a category's images and return the matching mask, or an empty mask when none exists."
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

    #[allow(clippy::type_complexity)]
    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        yaml_path: String,
        parent_dir: String,
        category: String,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>, String, String)> {
        let results = self.cycle(py, &yaml_path, &parent_dir, &category);

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("YamlImageCyclerSimple error, {e}");
                if let Err(e) =
                    self.send_error(py, "YamlImageCyclerSimple".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl YamlImageCyclerSimple {
    /// 巡回主流程
    #[allow(clippy::type_complexity)]
    fn cycle<'py>(
        &mut self,
        py: Python<'py>,
        yaml_path: &str,
        parent_dir: &str,
        category: &str,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>, String, String), Error> {
        let settings = self.settings.load(yaml_path)?;
        let config = settings.category(category)?;

        let cat_folder = Path::new(parent_dir).join(category);
        let images = list_image_files(&cat_folder)?;

        let (current_idx, filename) = self.cursor.advance(category, &images)?;

        let image_path = cat_folder.join(&filename);
        if !image_path.is_file() {
            return Err(Error::ImageNotFound(
                image_path.to_string_lossy().to_string(),
            ));
        }
        let img = image::open(&image_path)?;

        // HWC -> NHWC
        let image_tensor = image_to_tensor(&img, &self.device)?.unsqueeze(0)?;

        // mask: 找不到时合成全零 mask, 解码失败是致命错误
        let mask_folder = config
            .mask_folder
            .as_ref()
            .map(|folder| Path::new(parent_dir).join(folder));
        let mask_tensor = self.load_mask_tensor(&image_path, mask_folder.as_deref(), &img)?;

        info!(
            "YamlImageCyclerSimple category: {category}, image: {filename} ({}/{})",
            current_idx + 1,
            images.len()
        );

        let image_wrapper: TensorWrapper<f32> = image_tensor.into();
        let mask_wrapper: TensorWrapper<f32> = mask_tensor.into();

        Ok((
            image_wrapper.to_py_tensor(py)?,
            mask_wrapper.to_py_tensor(py)?,
            category.to_string(),
            yaml_path.to_string(),
        ))
    }

    /// 查找并加载 mask 张量
    fn load_mask_tensor(
        &self,
        image_path: &Path,
        mask_folder: Option<&Path>,
        img: &image::DynamicImage,
    ) -> Result<Tensor, Error> {
        match self.find_mask_file(image_path, mask_folder) {
            Some(mask_path) => {
                info!(
                    "YamlImageCyclerSimple mask: {}",
                    mask_path.to_string_lossy()
                );
                let mask = image::open(&mask_path)?;
                mask_to_tensor(&mask, &self.device)
            }
            None => {
                info!("YamlImageCyclerSimple mask not found, using empty mask");
                zero_mask(img.height() as usize, img.width() as usize, &self.device)
            }
        }
    }

    /// 查找图像对应的 mask 文件
    ///
    /// 配置了 mask_folder 且目录存在时只搜索该目录,
    /// 否则依次搜索图像目录下的 masks 子目录和图像目录本身
    fn find_mask_file(&self, image_path: &Path, mask_folder: Option<&Path>) -> Option<PathBuf> {
        let stem = image_path.file_stem()?.to_string_lossy().to_string();
        let image_dir = image_path.parent()?;

        let search_dirs: Vec<PathBuf> = match mask_folder {
            Some(dir) if dir.is_dir() => vec![dir.to_path_buf()],
            _ => vec![image_dir.join("masks"), image_dir.to_path_buf()],
        };

        for dir in search_dirs {
            if !dir.is_dir() {
                continue;
            }
            for ext in MASK_EXTENSIONS {
                let candidate = dir.join(format!("{stem}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn node() -> YamlImageCyclerSimple {
        YamlImageCyclerSimple {
            device: Device::Cpu,
            cursor: ImageCursor::new(),
            settings: SettingsCache::new(),
        }
    }

    #[test]
    fn test_find_mask_in_masks_subfolder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let image_path = dir.path().join("a.png");
        fs::write(&image_path, b"")?;
        fs::create_dir(dir.path().join("masks"))?;
        fs::write(dir.path().join("masks").join("a.png"), b"")?;

        let found = node().find_mask_file(&image_path, None);
        assert_eq!(found, Some(dir.path().join("masks").join("a.png")));

        Ok(())
    }

    #[test]
    fn test_find_mask_prefers_configured_folder() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let image_path = dir.path().join("a.png");
        fs::write(&image_path, b"")?;
        // 图像目录里有同名文件, 但配置目录优先
        fs::write(dir.path().join("a.jpg"), b"")?;
        let mask_dir = dir.path().join("portrait_masks");
        fs::create_dir(&mask_dir)?;
        fs::write(mask_dir.join("a.webp"), b"")?;

        let found = node().find_mask_file(&image_path, Some(&mask_dir));
        assert_eq!(found, Some(mask_dir.join("a.webp")));

        Ok(())
    }

    #[test]
    fn test_undecodable_mask_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let image_path = dir.path().join("a.png");
        fs::create_dir(dir.path().join("masks"))?;
        // mask 文件存在但不是合法图像, 不允许退化为全零 mask
        fs::write(dir.path().join("masks").join("a.png"), b"not an image")?;

        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
        let err = node()
            .load_mask_tensor(&image_path, None, &img)
            .unwrap_err();
        assert!(matches!(err, Error::ImageError(_)));

        Ok(())
    }

    #[test]
    fn test_find_mask_missing_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        // tga 不在 mask 扩展名列表里, 图像本身不会被当成 mask
        let image_path = dir.path().join("a.tga");
        fs::write(&image_path, b"")?;

        assert_eq!(node().find_mask_file(&image_path, None), None);

        Ok(())
    }
}
