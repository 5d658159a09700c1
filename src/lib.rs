use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod assembler;
pub mod captions;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod media;
pub mod narration;
pub mod platform;
pub mod publish;
pub mod render;
pub mod schedule;
pub mod script;
pub mod subtitles;

pub type GeneratorLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<GeneratorLogHook>>> = Lazy::new(|| Mutex::new(None));

pub fn set_log_hook(hook: Option<GeneratorLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

fn forward_to_hook(tag: &str, message: &str) {
    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    let message = message.as_ref();
    tracing::info!("{}", message);
    forward_to_hook("INFO", message);
}

pub(crate) fn logok(message: impl AsRef<str>) {
    let message = message.as_ref();
    tracing::info!(status = "ok", "{}", message);
    forward_to_hook("OK", message);
}

pub(crate) fn logw(message: impl AsRef<str>) {
    let message = message.as_ref();
    tracing::warn!("{}", message);
    forward_to_hook("WARN", message);
}
