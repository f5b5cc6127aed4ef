//! 节点分类

/// 加载器
pub const CATEGORY_LOADERS: &str = "YamlCycler/Loaders";
