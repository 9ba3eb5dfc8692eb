use std::env;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use libloading::Library;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ForwarderError, Result};
use crate::record::{normalize, Input, TelemetryRecord};

/// Port for turning one raw input into a deliverable record. The pipeline
/// receives exactly one implementation at construction and uses it for the
/// whole process lifetime.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, input: Input, schema_hint: &str) -> Result<TelemetryRecord>;

    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// The built-in transform: plain normalization, never fails.
pub struct BuiltinNormalizer;

#[async_trait]
impl Transform for BuiltinNormalizer {
    async fn apply(&self, input: Input, schema_hint: &str) -> Result<TelemetryRecord> {
        Ok(normalize(input, schema_hint))
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

// C ABI expected from a transform plugin. `input` and `hint` are UTF-8
// buffers (the input rendered as JSON, and the schema hint); the plugin
// writes a JSON `{payload, schema}` object to `out`. The return value is the
// number of bytes written, the required capacity when it exceeds `out_cap`,
// or a negative code on failure.
type RawTransformFn = unsafe extern "C" fn(
    input: *const u8,
    input_len: usize,
    hint: *const u8,
    hint_len: usize,
    out: *mut u8,
    out_cap: usize,
) -> isize;

const TRANSFORM_SYMBOL: &[u8] = b"transform";
const INITIAL_OUT_CAP: usize = 4096;

/// A transform loaded from an external dynamic library.
pub struct PluginTransform {
    func: RawTransformFn,
    // Keeps the library mapped for as long as func may be called.
    _library: Library,
}

impl PluginTransform {
    /// Opens the library at `path` and resolves its `transform` symbol.
    pub fn load(path: &Path) -> Result<Self> {
        let resolved = resolve_path(path);

        // Safety: loading runs arbitrary library initializers; the plugin is
        // trusted the same way the rest of the deployment is.
        let library = unsafe { Library::new(&resolved) }.map_err(|e| {
            ForwarderError::Transform(format!("Failed to load '{}': {}", resolved.display(), e))
        })?;

        // Safety: the symbol is only used with the documented signature.
        let func = unsafe {
            *library.get::<RawTransformFn>(TRANSFORM_SYMBOL).map_err(|e| {
                ForwarderError::Transform(format!(
                    "No transform symbol in '{}': {}",
                    resolved.display(),
                    e
                ))
            })?
        };

        Ok(PluginTransform {
            func,
            _library: library,
        })
    }
}

#[async_trait]
impl Transform for PluginTransform {
    async fn apply(&self, input: Input, schema_hint: &str) -> Result<TelemetryRecord> {
        invoke(self.func, &encode_input(input), schema_hint)
    }

    fn name(&self) -> &'static str {
        "plugin"
    }
}

// Drives one call through the plugin ABI: hand the buffers over, grow and
// retry once when the plugin reports a larger required capacity, then
// decode the record it wrote.
fn invoke(func: RawTransformFn, input_json: &str, schema_hint: &str) -> Result<TelemetryRecord> {
    let input = input_json.as_bytes();
    let hint = schema_hint.as_bytes();
    let mut out = vec![0u8; INITIAL_OUT_CAP];

    // Safety: all buffers stay live across the call and the plugin only
    // writes within out_cap per the ABI contract.
    let mut written = unsafe {
        func(
            input.as_ptr(),
            input.len(),
            hint.as_ptr(),
            hint.len(),
            out.as_mut_ptr(),
            out.len(),
        )
    };

    if written > out.len() as isize {
        // The plugin reported the capacity it needs; retry once with it
        out = vec![0u8; written as usize];
        written = unsafe {
            func(
                input.as_ptr(),
                input.len(),
                hint.as_ptr(),
                hint.len(),
                out.as_mut_ptr(),
                out.len(),
            )
        };
    }

    if written < 0 {
        return Err(ForwarderError::Transform(format!(
            "Plugin transform failed with code {}",
            written
        )));
    }

    let written = written as usize;
    if written > out.len() {
        return Err(ForwarderError::Transform(
            "Plugin transform output exceeded its reported size".to_string(),
        ));
    }

    let record: TelemetryRecord = serde_json::from_slice(&out[..written]).map_err(|e| {
        ForwarderError::Transform(format!("Plugin transform returned malformed record: {}", e))
    })?;

    Ok(record)
}

// Renders an input as the JSON text handed to a plugin: text and bytes
// become a JSON string, structured values pass through unchanged.
fn encode_input(input: Input) -> String {
    let value = match input {
        Input::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Input::Text(text) => Value::String(text),
        Input::Structured(value) => value,
    };
    value.to_string()
}

// Relative plugin paths resolve against the working directory rather than
// the platform loader's library search path.
fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Loads the configured transform plugin, falling back to the built-in
/// normalizer when no path is configured or loading fails. Load failure is
/// a warning, never fatal to the process.
pub fn load_transform(path: Option<&Path>) -> Box<dyn Transform> {
    match path {
        Some(path) => match PluginTransform::load(path) {
            Ok(plugin) => {
                info!("Loaded transform plugin from {}", path.display());
                Box::new(plugin)
            }
            Err(e) => {
                warn!(
                    "Failed to load transform plugin, using built-in normalizer: {}",
                    e
                );
                Box::new(BuiltinNormalizer)
            }
        },
        None => Box::new(BuiltinNormalizer),
    }
}
