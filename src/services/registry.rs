//! 模型目录
//!
//! 内置目录覆盖常用开源模型；设置 MODEL_CATALOG_PATH 可用本地 JSON 整体替换。
//! 查找顺序：先按净化后的文档 ID（`/` 换 `-`），再按原始名称扫描

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::model::{HardwareRequirements, ModelEntry, ModelSpecs};

/// 模型目录
pub struct ModelRegistry {
    /// 键为净化后的文档 ID
    models: HashMap<String, ModelEntry>,
}

impl ModelRegistry {
    /// 按配置加载：有目录文件用文件，否则用内置目录；文件坏了退回内置并告警
    pub fn load(catalog_path: Option<&str>) -> Self {
        match catalog_path {
            Some(path) => match Self::from_json_file(path) {
                Ok(registry) => {
                    info!(path = %path, models = registry.len(), "Loaded model catalog from file");
                    registry
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load model catalog, using bundled");
                    Self::bundled()
                }
            },
            None => Self::bundled(),
        }
    }

    /// 从 JSON 文件加载（`ModelEntry` 数组）
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<ModelEntry> = serde_json::from_str(&content)?;
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: Vec<ModelEntry>) -> Self {
        let models = entries
            .into_iter()
            .map(|entry| (document_id(&entry.name), entry))
            .collect();
        Self { models }
    }

    /// 查模型：净化 ID 直查，未命中再按 `name` 字段扫描
    pub fn get(&self, model_id: &str) -> Option<&ModelEntry> {
        if let Some(entry) = self.models.get(&document_id(model_id)) {
            return Some(entry);
        }
        self.models.values().find(|entry| entry.name == model_id)
    }

    pub fn requirements(&self, model_id: &str) -> Option<&HardwareRequirements> {
        self.get(model_id).map(|entry| &entry.requirements)
    }

    pub fn specs(&self, model_id: &str) -> Option<&ModelSpecs> {
        self.get(model_id).map(|entry| &entry.specifications)
    }

    pub fn model_type(&self, model_id: &str) -> Option<&str> {
        self.get(model_id).map(|entry| entry.model_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 内置目录
    pub fn bundled() -> Self {
        let entries = vec![
            // Whisper (语音识别)
            entry("openai/whisper-tiny", "speech_recognition", "OpenAI",
                  (2, 4, 1.0, 8), ("39M", 30, "FP16")),
            entry("openai/whisper-base", "speech_recognition", "OpenAI",
                  (4, 4, 1.0, 4), ("74M", 30, "FP16")),
            entry("openai/whisper-small.en", "speech_recognition", "OpenAI",
                  (4, 4, 1.0, 4), ("244M", 30, "FP16")),
            entry("openai/whisper-medium", "speech_recognition", "OpenAI",
                  (4, 8, 1.5, 8), ("769M", 30, "FP16")),
            entry("openai/whisper-large", "speech_recognition", "OpenAI",
                  (8, 16, 3.0, 16), ("1.5B", 30, "FP16")),
            entry("openai/whisper-large-v2", "speech_recognition", "OpenAI",
                  (8, 16, 3.0, 16), ("1.5B", 30, "FP16")),
            entry("openai/whisper-large-v3", "speech_recognition", "OpenAI",
                  (8, 16, 3.0, 16), ("1.5B", 30, "FP16")),
            entry("openai/whisper-large-v3-turbo", "speech_recognition", "OpenAI",
                  (8, 16, 3.0, 16), ("1.5B", 30, "FP16")),
            // GPT-2
            entry("gpt2", "text_generation", "OpenAI",
                  (4, 8, 1.5, 4), ("124M", 1024, "FP16")),
            entry("gpt2-medium", "text_generation", "OpenAI",
                  (4, 8, 2.0, 8), ("355M", 1024, "FP16")),
            entry("gpt2-large", "text_generation", "OpenAI",
                  (8, 16, 3.0, 16), ("774M", 1024, "FP16")),
            // DeepSeek
            entry("deepseek-ai/DeepSeek-R1-Distill-Qwen-7B", "text_generation", "DeepSeek",
                  (8, 16, 14.0, 16), ("7B", 4096, "FP16")),
            entry("deepseek-ai/DeepSeek-R1-Distill-Qwen-14B", "text_generation", "DeepSeek",
                  (16, 32, 28.0, 32), ("14B", 4096, "FP16")),
            entry("deepseek-ai/DeepSeek-R1-Distill-Qwen-32B", "text_generation", "DeepSeek",
                  (32, 64, 56.0, 64), ("32B", 4096, "FP16")),
            entry("deepseek-ai/deepseek-coder-6.7b-instruct", "text_generation", "DeepSeek",
                  (8, 16, 14.0, 16), ("6.7B", 4096, "FP16")),
            // OpenELM
            entry("apple/OpenELM-270M", "text_generation", "Apple",
                  (4, 8, 1.0, 8), ("270M", 2048, "FP16")),
            entry("apple/OpenELM-450M", "text_generation", "Apple",
                  (4, 8, 1.5, 8), ("450M", 2048, "FP16")),
            entry("apple/OpenELM-1.1B", "text_generation", "Apple",
                  (4, 8, 3.0, 8), ("1.1B", 2048, "FP16")),
            entry("apple/OpenELM-3B", "text_generation", "Apple",
                  (8, 16, 6.0, 8), ("3B", 2048, "FP16")),
            // Meta
            entry("meta-llama/Llama-3.2-1B", "text_generation", "Meta",
                  (4, 8, 2.0, 16), ("1.1B", 2048, "FP16")),
            // 语音合成
            entry("microsoft/speecht5_tts", "text_to_speech", "Microsoft",
                  (8, 16, 8.0, 16), ("760M", 1024, "FP16")),
        ];

        Self::from_entries(entries)
    }
}

/// 目录文档 ID：`/` 不是合法的文档 ID 字符，换成 `-`（保留大小写）
fn document_id(model_id: &str) -> String {
    model_id.replace('/', "-")
}

fn entry(
    name: &str,
    model_type: &str,
    provider: &str,
    (cpu_cores, ram_gb, storage_gb, gpu_memory_gb): (u32, u32, f64, u32),
    (parameters, context_size, precision): (&str, u32, &str),
) -> ModelEntry {
    ModelEntry {
        name: name.to_string(),
        model_type: model_type.to_string(),
        provider: provider.to_string(),
        requirements: HardwareRequirements {
            cpu_cores,
            ram_gb,
            storage_gb,
            gpu_memory_gb,
        },
        specifications: ModelSpecs {
            parameters: parameters.to_string(),
            context_size,
            precision: precision.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_catalog_size() {
        let registry = ModelRegistry::bundled();
        assert_eq!(registry.len(), 21);
    }

    #[test]
    fn test_lookup_by_sanitized_id() {
        let registry = ModelRegistry::bundled();
        // 斜杠在文档 ID 里被净化成连字符
        let entry = registry.get("openai-whisper-tiny").unwrap();
        assert_eq!(entry.name, "openai/whisper-tiny");
    }

    #[test]
    fn test_lookup_by_original_name() {
        let registry = ModelRegistry::bundled();
        let entry = registry.get("deepseek-ai/DeepSeek-R1-Distill-Qwen-7B").unwrap();
        assert_eq!(entry.provider, "DeepSeek");
        assert_eq!(entry.requirements.gpu_memory_gb, 16);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = ModelRegistry::bundled();
        assert!(registry.get("apple/OpenELM-270M").is_some());
        assert!(registry.get("apple/openelm-270m").is_none());
    }

    #[test]
    fn test_unknown_model_returns_none() {
        let registry = ModelRegistry::bundled();
        assert!(registry.get("no-such/model").is_none());
        assert!(registry.requirements("no-such/model").is_none());
    }

    #[test]
    fn test_requirements_and_specs_accessors() {
        let registry = ModelRegistry::bundled();
        let requirements = registry.requirements("gpt2").unwrap();
        assert_eq!(requirements.cpu_cores, 4);
        assert_eq!(requirements.storage_gb, 1.5);

        let specs = registry.specs("gpt2").unwrap();
        assert_eq!(specs.parameters, "124M");
        assert_eq!(specs.context_size, 1024);

        assert_eq!(registry.model_type("gpt2"), Some("text_generation"));
    }

    #[test]
    fn test_catalog_file_override() {
        let dir = std::env::temp_dir().join(format!("xjp-model-deploy-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.json");
        std::fs::write(
            &path,
            r#"[{
                "name": "my-org/custom-model",
                "model_type": "text_generation",
                "provider": "MyOrg",
                "requirements": {"cpu_cores": 2, "ram_gb": 4, "storage_gb": 1.0, "gpu_memory_gb": 0},
                "specifications": {"parameters": "10M", "context_size": 512, "precision": "FP32"}
            }]"#,
        )
        .unwrap();

        let registry = ModelRegistry::load(Some(path.to_str().unwrap()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("my-org/custom-model").is_some());
        assert!(registry.get("gpt2").is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_broken_catalog_file_falls_back_to_bundled() {
        let registry = ModelRegistry::load(Some("/nonexistent/catalog.json"));
        assert_eq!(registry.len(), 21);
    }
}
