//! LoRA 引用解析与文件名匹配
//!
//! 配置文件中的引用格式: `<lora:name:weight>` 或裸名称

use std::str::FromStr;

use strum_macros::{Display, EnumString};

use crate::error::Error;

/// 引用前缀
const LORA_PREFIX: &str = "<lora:";

/// 匹配时按顺序尝试的模型文件扩展名
pub const LORA_EXTENSIONS: [&str; 4] = [".safetensors", ".ckpt", ".pt", ".pth"];

/// 解析后的 LoRA 引用
#[derive(Debug, Clone, PartialEq)]
pub struct LoraReference {
    pub name: String,
    pub weight: f32,
}

/// 解析 LoRA 引用字符串
///
/// 手工编写的配置容错优先: 所有畸形输入都退化为默认值, 不报错
///
/// ```
/// use comfyui_yaml_cycler::core::lora::parse_lora_reference;
///
/// let lora = parse_lora_reference("<lora:char1:0.8>");
/// assert_eq!(lora.name, "char1");
/// assert_eq!(lora.weight, 0.8);
/// ```
pub fn parse_lora_reference(raw: &str) -> LoraReference {
    if raw.is_empty() {
        return LoraReference {
            name: String::new(),
            weight: 1.0,
        };
    }

    // <lora:name:weight> 形式
    if let Some(content) = raw
        .strip_prefix(LORA_PREFIX)
        .and_then(|v| v.strip_suffix('>'))
    {
        let parts: Vec<&str> = content.split(':').collect();
        let name = parts.first().map(|v| v.trim()).unwrap_or_default();
        // 权重解析失败时退化为 1.0
        let weight = parts
            .get(1)
            .and_then(|v| v.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        return LoraReference {
            name: name.to_string(),
            weight,
        };
    }

    // 裸名称
    LoraReference {
        name: raw.trim().to_string(),
        weight: 1.0,
    }
}

/// 匹配结果
///
/// 区分精确命中与大小写纠正命中, 由调用方决定是否提示;
/// 未命中不是错误, 回退策略由各节点自行决定
#[derive(Debug, Clone, PartialEq)]
pub enum LoraResolution {
    /// 精确命中, 返回清单中的原始条目
    Exact(String),
    /// 忽略大小写后命中, 名称与清单条目不一致
    CaseCorrected(String),
    /// 清单中不存在
    NotFound,
}

/// 名称匹配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ResolveMode {
    /// 在清单中校验名称
    Validate,
    /// 跳过校验, 原样返回
    Raw,
}

impl ResolveMode {
    pub fn parse(mode: &str) -> Result<Self, Error> {
        Self::from_str(mode).map_err(|e| Error::ParseEnumString(e.to_string()))
    }
}

/// 去掉文件名扩展名
pub fn strip_extension(filename: &str) -> &str {
    filename
        .rfind('.')
        .map(|idx| &filename[..idx])
        .unwrap_or(filename)
}

/// 在清单中查找名称对应的条目
///
/// 匹配优先级:
/// 1. `name + 扩展名` 精确匹配, 扩展名按固定顺序尝试
/// 2. 去扩展名后精确匹配
/// 3. 去扩展名后忽略大小写匹配
///
/// 同级多个候选时取清单迭代顺序的第一个
pub fn resolve_lora_file(name: &str, inventory: &[String]) -> LoraResolution {
    if name.is_empty() {
        return LoraResolution::NotFound;
    }

    // 带扩展名的精确匹配
    for ext in LORA_EXTENSIONS {
        let candidate = format!("{name}{ext}");
        if inventory.iter().any(|entry| *entry == candidate) {
            return LoraResolution::Exact(candidate);
        }
    }

    // 去扩展名的精确匹配
    for entry in inventory {
        if strip_extension(entry) == name {
            return LoraResolution::Exact(entry.clone());
        }
    }

    // 去扩展名的忽略大小写匹配
    for entry in inventory {
        if strip_extension(entry).eq_ignore_ascii_case(name) {
            return LoraResolution::CaseCorrected(entry.clone());
        }
    }

    LoraResolution::NotFound
}

/// 在去扩展名的清单中查找名称
///
/// 清单条目已经去过扩展名, 直接按原样比较, 不做二次去扩展名;
/// 含点号的名称 (如 MyLora-v1.0) 不会被误截断
pub fn resolve_lora_name(name: &str, stripped_inventory: &[String]) -> LoraResolution {
    if name.is_empty() {
        return LoraResolution::NotFound;
    }

    for entry in stripped_inventory {
        if entry == name {
            return LoraResolution::Exact(entry.clone());
        }
    }

    for entry in stripped_inventory {
        if entry.eq_ignore_ascii_case(name) {
            return LoraResolution::CaseCorrected(entry.clone());
        }
    }

    LoraResolution::NotFound
}
