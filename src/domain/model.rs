//! 模型目录领域模型
//!
//! 纯数据类型，无 tokio/axum 依赖

use serde::{Deserialize, Serialize};

/// 模型硬件需求
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HardwareRequirements {
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub storage_gb: f64,
    pub gpu_memory_gb: u32,
}

/// 模型规格
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpecs {
    /// 参数量，如 "270M"、"7B"
    pub parameters: String,
    pub context_size: u32,
    /// 推理精度，如 "FP16"
    pub precision: String,
}

/// 目录条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelEntry {
    /// HuggingFace 形式的模型名，如 "apple/OpenELM-270M"
    pub name: String,
    /// 类型标签，如 "text_generation"、"speech_recognition"
    pub model_type: String,
    pub requirements: HardwareRequirements,
    pub specifications: ModelSpecs,
    pub provider: String,
}

/// 本机硬件核查结果：逐项满足与否
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HardwareCheck {
    pub cpu: bool,
    pub ram: bool,
    pub gpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_roundtrip() {
        let json = r#"{"cpu_cores": 4, "ram_gb": 8, "storage_gb": 1.5, "gpu_memory_gb": 8}"#;
        let req: HardwareRequirements = serde_json::from_str(json).unwrap();
        assert_eq!(req.cpu_cores, 4);
        assert_eq!(req.storage_gb, 1.5);

        let back = serde_json::to_value(&req).unwrap();
        assert_eq!(back.get("ram_gb").unwrap().as_u64(), Some(8));
    }
}
