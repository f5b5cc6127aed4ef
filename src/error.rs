//! 错误处理

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // 标准库错误处理
    #[error("io error, {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file not found: {0}")]
    SettingsNotFound(String),
    #[error("settings parse error, {0}")]
    SettingsParse(#[from] serde_yaml::Error),
    #[error("category '{category}' not found in settings, available categories: {available:?}")]
    InvalidCategory {
        category: String,
        available: Vec<String>,
    },

    #[error("invalid directory, {0}")]
    InvalidDirectory(String),
    #[error("no images found in folder {0}")]
    EmptyFolder(String),
    #[error("image file not found: {0}")]
    ImageNotFound(String),
    #[error("image error, {0}")]
    ImageError(#[from] image::ImageError),

    #[error("tensor error, {0}")]
    TensorErr(#[from] candle_core::Error),

    #[error("py error, {0}")]
    PyErr(#[from] pyo3::PyErr),

    #[error("strum error, {0}")]
    ParseEnumString(String),
}
