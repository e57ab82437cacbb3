use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::now_compact;

#[derive(Debug, Clone)]
pub struct InputBackup {
    pub path: PathBuf,
    pub md5: String,
}

pub fn file_md5(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

/// Copies `src` to `<dir>/<file name>.<YYYYmmdd_HHMMSS>.bak`.
pub fn backup_input(src: &Path, dir: &Path) -> Result<InputBackup> {
    let metadata = fs::metadata(src)
        .with_context(|| format!("failed to read file metadata: {}", src.display()))?;
    if !metadata.is_file() {
        return Err(anyhow!("backup source is not a file: {}", src.display()));
    }
    let md5 = file_md5(src)?;

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create backup dir: {}", dir.display()))?;
    let file_name = src
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("input");
    let path = dir.join(format!(
        "{}.{}.bak",
        sanitize_filename_component(file_name),
        now_compact()
    ));
    fs::copy(src, &path).with_context(|| {
        format!(
            "failed to copy backup from {} to {}",
            src.display(),
            path.display()
        )
    })?;
    Ok(InputBackup { path, md5 })
}

fn sanitize_filename_component(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_input_with_timestamped_name() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("settings.js");
        fs::write(&input, "var settings = {};").expect("write");

        let backup = backup_input(&input, &dir.path().join("backups")).expect("backup");
        let name = backup
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("name");
        assert!(name.starts_with("settings.js."));
        assert!(name.ends_with(".bak"));
        assert_eq!(name.len(), "settings.js.".len() + 15 + ".bak".len());
        assert_eq!(fs::read_to_string(&backup.path).expect("read"), "var settings = {};");
        assert_eq!(backup.md5, format!("{:x}", md5::compute(b"var settings = {};")));
    }

    #[test]
    fn rejects_directories() {
        let dir = tempdir().expect("tempdir");
        assert!(backup_input(dir.path(), &dir.path().join("backups")).is_err());
    }
}
