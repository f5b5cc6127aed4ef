//! setting.yaml 配置文件
//!
//! 顶层 key 为分类名称, value 为分类配置

use std::{collections::BTreeMap, collections::HashMap, fs, path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::error::Error;

/// 默认配置文件路径
pub const DEFAULT_SETTINGS_FILE: &str = "setting.yaml";

/// 分类配置
///
/// 手工编写的配置文件, 字段均可省略, 缺省等价于空字符串
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CategorySettings {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub lora1: String,
    #[serde(default)]
    pub lora2: String,
    #[serde(default)]
    pub lora3: String,
    /// mask 搜索目录, 相对于 parent_dir
    #[serde(default)]
    pub mask_folder: Option<String>,
}

/// 配置文档
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Settings(BTreeMap<String, CategorySettings>);

impl Settings {
    /// 分类名称列表
    pub fn category_keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// 获取分类配置, 分类不存在时在错误信息中列出可用的分类
    pub fn category(&self, name: &str) -> Result<&CategorySettings, Error> {
        self.0.get(name).ok_or_else(|| Error::InvalidCategory {
            category: name.to_string(),
            available: self.category_keys(),
        })
    }
}

/// 带缓存的配置加载器
///
/// 缓存归属于单个节点实例, 以规范化后的绝对路径为 key,
/// 同一文件的相对/绝对写法命中同一条缓存
#[derive(Debug, Default)]
pub struct SettingsCache {
    buf: HashMap<PathBuf, Arc<Settings>>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加载配置文件, 文件不存在时报错
    pub fn load(&mut self, path: &str) -> Result<Arc<Settings>, Error> {
        let abs_path = fs::canonicalize(path)
            .map_err(|_| Error::SettingsNotFound(path.to_string()))?;

        if let Some(settings) = self.buf.get(&abs_path) {
            return Ok(settings.clone());
        }

        let content = fs::read_to_string(&abs_path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        let settings = Arc::new(settings);
        self.buf.insert(abs_path, settings.clone());

        Ok(settings)
    }
}

/// 获取配置文件顶层的分类名称, 用于 INPUT_TYPES 下拉框
///
/// 读取失败时返回空列表, 由 UI 降级为手工输入
pub fn peek_category_keys(path: &str) -> Vec<String> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_yaml::from_str::<Settings>(&content).ok())
        .map(|settings| settings.category_keys())
        .unwrap_or_default()
}
