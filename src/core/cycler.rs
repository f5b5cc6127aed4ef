//! 分类图像巡回
//!
//! 每个分类维护一个独立的巡回游标, 每次调用依次返回下一张图像

use std::{collections::HashMap, collections::HashSet, fs, path::Path};

use lazy_static::lazy_static;

use crate::error::Error;

// 支持的图像文件扩展名
lazy_static! {
    static ref SUPPORTED_IMAGE_EXTENSIONS: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("png");
        set.insert("jpg");
        set.insert("jpeg");
        set.insert("bmp");
        set.insert("webp");
        set.insert("tiff");
        set.insert("tga");
        set
    };
}

/// 图像文件检测
fn is_img_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .any(|e| ext.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// 获取文件夹下的图像文件名列表
///
/// 每次调用都重新扫描文件系统, 按字典序排序;
/// 文件夹不存在或没有图像时报错
pub fn list_image_files(folder: &Path) -> Result<Vec<String>, Error> {
    if !folder.is_dir() {
        return Err(Error::InvalidDirectory(
            folder.to_string_lossy().to_string(),
        ));
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_img_file(&path) {
            if let Some(name) = path.file_name() {
                images.push(name.to_string_lossy().to_string());
            }
        }
    }
    images.sort_unstable();

    if images.is_empty() {
        return Err(Error::EmptyFolder(folder.to_string_lossy().to_string()));
    }

    Ok(images)
}

/// 分类巡回游标
///
/// 游标归属于单个节点实例, 不跨进程持久化
#[derive(Debug, Default)]
pub struct ImageCursor {
    cursor: HashMap<String, usize>,
}

impl ImageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出当前分类的下一张图像, 并推进游标
    ///
    /// 读取时取模: 文件夹缩小导致游标越界时重新归一化, 而不是报错
    pub fn advance(&mut self, category: &str, images: &[String]) -> Result<(usize, String), Error> {
        if images.is_empty() {
            return Err(Error::EmptyFolder(category.to_string()));
        }

        let current_idx = self.cursor.get(category).copied().unwrap_or(0) % images.len();
        // 下次调用用 +1, 取模防止溢出
        self.cursor
            .insert(category.to_string(), (current_idx + 1) % images.len());

        Ok((current_idx, images[current_idx].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_round_robin_visits_all_then_wraps() -> anyhow::Result<()> {
        let images = names(&["a.png", "b.png", "c.png"]);
        let mut cursor = ImageCursor::new();

        let mut seen = Vec::new();
        for _ in 0..images.len() {
            let (_, name) = cursor.advance("portrait", &images)?;
            seen.push(name);
        }
        assert_eq!(seen, images);

        // 第 N+1 次回到第一张
        let (idx, name) = cursor.advance("portrait", &images)?;
        assert_eq!(idx, 0);
        assert_eq!(name, "a.png");

        Ok(())
    }

    #[test]
    fn test_categories_are_independent() -> anyhow::Result<()> {
        let images = names(&["a.png", "b.png"]);
        let mut cursor = ImageCursor::new();

        cursor.advance("portrait", &images)?;
        cursor.advance("portrait", &images)?;

        // 新分类从 0 开始
        let (idx, _) = cursor.advance("landscape", &images)?;
        assert_eq!(idx, 0);

        Ok(())
    }

    #[test]
    fn test_shrinking_list_renormalizes() -> anyhow::Result<()> {
        let mut cursor = ImageCursor::new();

        let full = names(&["a.png", "b.png", "c.png", "d.png"]);
        for _ in 0..3 {
            cursor.advance("portrait", &full)?;
        }

        // 存储的游标为 3, 列表缩小到 2 张时按新长度取模
        let shrunk = names(&["a.png", "b.png"]);
        let (idx, name) = cursor.advance("portrait", &shrunk)?;
        assert_eq!(idx, 3 % shrunk.len());
        assert_eq!(name, "b.png");

        Ok(())
    }

    #[test]
    fn test_empty_list_is_fatal() {
        let mut cursor = ImageCursor::new();
        let err = cursor.advance("portrait", &[]).unwrap_err();
        assert!(matches!(err, Error::EmptyFolder(_)));
    }

    #[test]
    fn test_list_image_files_sorted_and_stable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.PNG", "a.jpg", "c.webp", "note.txt", "d.tga"] {
            std::fs::write(dir.path().join(name), b"")?;
        }

        let first = list_image_files(dir.path())?;
        assert_eq!(first, vec!["a.jpg", "b.PNG", "c.webp", "d.tga"]);

        // 文件系统未变化时, 两次扫描结果一致
        let second = list_image_files(dir.path())?;
        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn test_cycle_with_settings_scenario() -> anyhow::Result<()> {
        use crate::core::{lora::parse_lora_reference, settings::SettingsCache};

        let dir = tempfile::tempdir()?;
        let yaml_path = dir.path().join("setting.yaml");
        std::fs::write(
            &yaml_path,
            "portrait:\n  prompt: \"a face\"\n  lora1: \"<lora:char1:0.7>\"\n",
        )?;
        let cat_folder = dir.path().join("portrait");
        std::fs::create_dir(&cat_folder)?;
        std::fs::write(cat_folder.join("a.png"), b"")?;
        std::fs::write(cat_folder.join("b.png"), b"")?;

        let mut settings = SettingsCache::new();
        let mut cursor = ImageCursor::new();

        let mut run = |expected: &str| -> anyhow::Result<()> {
            let loaded = settings.load(yaml_path.to_str().unwrap())?;
            let config = loaded.category("portrait")?;
            let images = list_image_files(&cat_folder)?;
            let (_, name) = cursor.advance("portrait", &images)?;

            assert_eq!(name, expected);
            assert_eq!(config.prompt, "a face");
            let lora = parse_lora_reference(&config.lora1);
            assert_eq!(lora.name, "char1");
            assert_eq!(lora.weight, 0.7);
            Ok(())
        };

        // 两张图轮流返回, 第三次回绕
        run("a.png")?;
        run("b.png")?;
        run("a.png")?;

        Ok(())
    }

    #[test]
    fn test_list_image_files_errors() -> anyhow::Result<()> {
        let err = list_image_files(Path::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, Error::InvalidDirectory(_)));

        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("note.txt"), b"")?;
        let err = list_image_files(dir.path()).unwrap_err();
        assert!(matches!(err, Error::EmptyFolder(_)));

        Ok(())
    }
}
