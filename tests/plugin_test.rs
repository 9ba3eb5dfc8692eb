use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

use telemetry_forwarder::record::Input;
use telemetry_forwarder::transform::{load_transform, Transform};

// A minimal transform library exercised through the real dynamic-loading
// path. It tags ordinary inputs, produces an output far larger than the
// host's initial buffer when asked to, and fails with a fixed code on
// request.
const PLUGIN_SOURCE: &str = r##"
use std::slice;
use std::str;

#[no_mangle]
pub extern "C" fn transform(
    input: *const u8,
    input_len: usize,
    hint: *const u8,
    hint_len: usize,
    out: *mut u8,
    out_cap: usize,
) -> isize {
    let input = unsafe { str::from_utf8(slice::from_raw_parts(input, input_len)).unwrap() };
    let hint = unsafe { str::from_utf8(slice::from_raw_parts(hint, hint_len)).unwrap() };

    if input.contains("fail") {
        return -7;
    }

    let payload = if input.contains("big") {
        "x".repeat(6000)
    } else {
        format!("plugin:{}", input.trim_matches('"'))
    };
    let record = format!("{{\"payload\":\"{}\",\"schema\":\"plugin-{}\"}}", payload, hint);

    let bytes = record.as_bytes();
    if bytes.len() > out_cap {
        return bytes.len() as isize;
    }
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len()) };
    bytes.len() as isize
}
"##;

fn build_plugin(dir: &Path) -> Result<PathBuf> {
    let source = dir.join("plugin.rs");
    fs::write(&source, PLUGIN_SOURCE)?;

    let library = dir.join("libplugin.so");
    let output = Command::new("rustc")
        .args(["--edition", "2021", "--crate-type", "cdylib"])
        .arg("-o")
        .arg(&library)
        .arg(&source)
        .output()?;
    assert!(
        output.status.success(),
        "plugin build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    Ok(library)
}

#[tokio::test]
async fn test_loaded_plugin_replaces_builtin_normalization() -> Result<()> {
    let temp_dir = tempdir()?;
    let library = build_plugin(temp_dir.path())?;

    let transform = load_transform(Some(&library));
    assert_eq!(transform.name(), "plugin");

    // Every invocation goes through the plugin, not built-in normalization
    let first = transform
        .apply(Input::Text("hello".to_string()), "events")
        .await?;
    assert_eq!(first.payload, "plugin:hello");
    assert_eq!(first.schema, "plugin-events");

    let second = transform
        .apply(Input::Text("again".to_string()), "events")
        .await?;
    assert_eq!(second.payload, "plugin:again");

    Ok(())
}

#[tokio::test]
async fn test_plugin_output_larger_than_the_initial_buffer_survives_intact() -> Result<()> {
    let temp_dir = tempdir()?;
    let library = build_plugin(temp_dir.path())?;
    let transform = load_transform(Some(&library));

    let record = transform
        .apply(Input::Text("big one".to_string()), "any")
        .await?;

    assert_eq!(record.payload.len(), 6000);
    assert!(record.payload.bytes().all(|b| b == b'x'));

    Ok(())
}

#[tokio::test]
async fn test_plugin_failure_code_surfaces_as_a_pipeline_error() -> Result<()> {
    let temp_dir = tempdir()?;
    let library = build_plugin(temp_dir.path())?;
    let transform = load_transform(Some(&library));

    let err = transform
        .apply(Input::Text("fail this".to_string()), "any")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("-7"));

    Ok(())
}
