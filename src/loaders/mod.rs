//! YAML 配置驱动的加载器节点

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod yaml_image_cycler;
pub use yaml_image_cycler::YamlImageCycler;

mod yaml_image_cycler_simple;
pub use yaml_image_cycler_simple::YamlImageCyclerSimple;

mod yaml_lora_extractor;
pub use yaml_lora_extractor::YamlLoraExtractor;

mod yaml_lora_loader;
pub use yaml_lora_loader::YamlLoraLoader;

mod yaml_lora_selector;
pub use yaml_lora_selector::YamlLoraSelector;

/// 加载器模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "loaders")?;
    submodule.add_class::<YamlImageCycler>()?;
    submodule.add_class::<YamlImageCyclerSimple>()?;
    submodule.add_class::<YamlLoraExtractor>()?;
    submodule.add_class::<YamlLoraLoader>()?;
    submodule.add_class::<YamlLoraSelector>()?;
    Ok(submodule)
}

/// 节点注册
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "YamlImageCycler",
            py.get_type::<YamlImageCycler>(),
            "YAML Image Cycler (Full)",
        ),
        NodeRegister(
            "YamlImageCyclerSimple",
            py.get_type::<YamlImageCyclerSimple>(),
            "YAML Image Cycler (Simple)",
        ),
        NodeRegister(
            "YamlLoraExtractor",
            py.get_type::<YamlLoraExtractor>(),
            "YAML LoRA Extractor",
        ),
        NodeRegister(
            "YamlLoraLoader",
            py.get_type::<YamlLoraLoader>(),
            "YAML LoRA Loader",
        ),
        NodeRegister(
            "YamlLoraSelector",
            py.get_type::<YamlLoraSelector>(),
            "YAML LoRA Selector",
        ),
    ];
    Ok(nodes)
}
