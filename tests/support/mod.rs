#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use llm_provider::Generator;
use llm_provider_mock::{ScriptedGenerator, ScriptedResponse};
use orin::app::build_controller;
use orin::OrinConfig;
use reasoner::ReasoningController;

pub fn scripted(responses: Vec<ScriptedResponse>) -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::new(responses))
}

pub fn controller(config: &OrinConfig, generator: &Arc<ScriptedGenerator>) -> ReasoningController {
    let generator: Arc<dyn Generator> = generator.clone();
    build_controller(config, generator).expect("controller should build")
}

pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix))
        })
        .collect();
    files.sort();
    files
}

pub fn utf8(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).expect("output should be utf-8")
}
