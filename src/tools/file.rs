//! Text file append tool.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use super::{str_arg, Tool};

const DEFAULT_FILENAME: &str = "output.txt";

/// Append a line of text to a file.
pub struct SaveToTxt;

#[async_trait]
impl Tool for SaveToTxt {
    fn name(&self) -> &str {
        "saveToTxt"
    }

    fn description(&self) -> &str {
        "Append text as a new line at the end of a file, creating the file and its directories if needed. Returns the absolute path of the file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path of the file to append to (default: output.txt)"
                },
                "data": {
                    "type": "string",
                    "description": "Text to append"
                }
            },
            "required": ["data"]
        })
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let filename = str_arg(&args, "filename").unwrap_or(DEFAULT_FILENAME);
        let data = text_arg(&args, "data");

        let path = absolute(workspace, Path::new(filename));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e)
            })?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;

        file.write_all(format!("{}\n", data).as_bytes()).await?;
        file.flush().await?;

        tracing::info!("Appended {} bytes to {}", data.len() + 1, path.display());

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Non-string values are written in their JSON form; null or missing is empty.
fn text_arg(args: &Value, key: &str) -> String {
    match args.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Resolve `path` against `base` and normalize `.` and `..` lexically.
pub(crate) fn absolute(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = if base.is_absolute() {
            base.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("/"))
                .join(base)
        };
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root.
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_line_and_returns_absolute_path() {
        let dir = tempfile::tempdir().expect("tempdir");

        let out = SaveToTxt
            .execute(json!({"filename": "out.txt", "data": "hello"}), dir.path())
            .await
            .unwrap();

        assert!(Path::new(&out).is_absolute());
        assert!(out.ends_with("out.txt"));
        let contents = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[tokio::test]
    async fn appends_rather_than_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");

        for line in ["first", "second"] {
            SaveToTxt
                .execute(json!({"filename": "log.txt", "data": line}), dir.path())
                .await
                .unwrap();
        }

        let contents = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");

        let out = SaveToTxt
            .execute(
                json!({"filename": "./notes/2024/today.txt", "data": "note"}),
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(Path::new(&out), dir.path().join("notes/2024/today.txt"));
        assert!(dir.path().join("notes/2024/today.txt").is_file());
    }

    #[tokio::test]
    async fn defaults_apply_to_missing_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");

        let out = SaveToTxt.execute(json!({}), dir.path()).await.unwrap();

        assert!(out.ends_with(DEFAULT_FILENAME));
        let contents = std::fs::read_to_string(dir.path().join(DEFAULT_FILENAME)).unwrap();
        assert_eq!(contents, "\n");
    }

    #[tokio::test]
    async fn non_string_data_is_serialized() {
        let dir = tempfile::tempdir().expect("tempdir");

        SaveToTxt
            .execute(json!({"filename": "n.txt", "data": 42}), dir.path())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("n.txt")).unwrap();
        assert_eq!(contents, "42\n");
    }

    #[cfg(unix)]
    #[test]
    fn absolute_keeps_absolute_paths() {
        let base = Path::new("/srv/work");
        assert_eq!(absolute(base, Path::new("/tmp/x.txt")), PathBuf::from("/tmp/x.txt"));
        assert_eq!(absolute(base, Path::new("./a/b.txt")), PathBuf::from("/srv/work/a/b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_collapses_parent_components() {
        let base = Path::new("/srv/work");
        assert_eq!(absolute(base, Path::new("../x.txt")), PathBuf::from("/srv/x.txt"));
        assert_eq!(absolute(base, Path::new("a/../../b/./c.txt")), PathBuf::from("/srv/b/c.txt"));
        assert_eq!(absolute(base, Path::new("/../../x.txt")), PathBuf::from("/x.txt"));
    }

    #[tokio::test]
    async fn parent_paths_are_returned_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = dir.path().join("ws");

        let out = SaveToTxt
            .execute(json!({"filename": "../x.txt", "data": "up"}), &workspace)
            .await
            .unwrap();

        assert_eq!(Path::new(&out), dir.path().join("x.txt"));
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "up\n");
    }
}
