//! Generator selection from configuration.

use std::sync::Arc;

use llm_provider::{Generator, GeneratorInitError};
use llm_provider_llamacpp::{LlamaCppConfig, LlamaCppGenerator};
use llm_provider_mock::ScriptedGenerator;
use llm_provider_ollama::{OllamaGenerator, OllamaGeneratorConfig};

use crate::config::{BackendKind, LlamaCppSection, OllamaSection, OrinConfig};

pub fn generator_from_config(config: &OrinConfig) -> Result<Arc<dyn Generator>, GeneratorInitError> {
    let generator: Arc<dyn Generator> = match config.backend {
        BackendKind::LlamaCpp => Arc::new(LlamaCppGenerator::new(llamacpp_config(
            &config.llamacpp,
        ))?),
        BackendKind::Ollama => Arc::new(OllamaGenerator::new(ollama_config(&config.ollama)?)?),
        BackendKind::Mock => Arc::new(ScriptedGenerator::echo()),
    };
    tracing::debug!(
        backend = config.backend.as_str(),
        model = %generator.profile().model_id,
        "generator ready"
    );
    Ok(generator)
}

fn llamacpp_config(section: &LlamaCppSection) -> LlamaCppConfig {
    let mut config = LlamaCppConfig::new(&section.binary_path, &section.model_path)
        .with_memory_map(section.use_memory_map)
        .with_gpu_layers(section.gpu_layers)
        .with_timeout(section.timeout())
        .with_grace_period(section.grace_period())
        .with_merged_stderr(section.merge_stderr);
    if let Some(context_size) = section.context_size {
        config = config.with_context_size(context_size);
    }
    if let Some(thread_count) = section.thread_count {
        config = config.with_thread_count(thread_count);
    }
    if let Some(batch_size) = section.batch_size {
        config = config.with_batch_size(batch_size);
    }
    config
}

fn ollama_config(section: &OllamaSection) -> Result<OllamaGeneratorConfig, GeneratorInitError> {
    let endpoint = section
        .endpoint()
        .map_err(|error| GeneratorInitError::new(error.to_string()))?;
    Ok(OllamaGeneratorConfig::new(&section.model)
        .with_base_url(&section.base_url)
        .with_endpoint(endpoint)
        .with_timeout(section.timeout()))
}
