use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipeline_pool::{HostMessage, PoolConfig, ProgressEvent, SerializedTensor, WorkerMessage};
use schemars::{JsonSchema, schema_for};
use tracing::info;

/// Emit the JSON Schemas of the public config and protocol types into
/// `out_dir`, one file per type. Returns the written paths.
pub fn write_schemas(out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("unable to create {}", out_dir.display()))?;

    let mut written = Vec::new();
    written.push(write_one::<PoolConfig>(out_dir, "pool-config")?);
    written.push(write_one::<HostMessage>(out_dir, "host-message")?);
    written.push(write_one::<WorkerMessage>(out_dir, "worker-message")?);
    written.push(write_one::<SerializedTensor>(out_dir, "serialized-tensor")?);
    written.push(write_one::<ProgressEvent>(out_dir, "progress-event")?);

    info!(schemas = written.len(), dir = %out_dir.display(), "schemas written");
    Ok(written)
}

fn write_one<T: JsonSchema>(out_dir: &Path, name: &str) -> Result<PathBuf> {
    let schema = schema_for!(T);
    let path = out_dir.join(format!("{name}.schema.json"));
    fs::write(&path, serde_json::to_string_pretty(&schema)?)
        .with_context(|| format!("unable to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_schemas(dir.path()).unwrap();
        assert_eq!(written.len(), 5);
        for path in written {
            let text = fs::read_to_string(&path).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert!(parsed.is_object(), "{} is not an object", path.display());
        }
    }
}
