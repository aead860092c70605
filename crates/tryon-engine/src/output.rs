use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tryon_contracts::ImagePayload;

/// How the caller wants a generated image handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Write `tryon-<millis>.<ext>` under `dir`.
    File { dir: PathBuf },
    /// Return a self-contained `data:` URL.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    File { path: PathBuf, reference: String },
    Inline { data_url: String },
}

pub fn deliver(image: &ImagePayload, mode: &OutputMode) -> Result<Delivered> {
    match mode {
        OutputMode::File { dir } => {
            let path = persist(image, dir)?;
            let reference = reference_for(dir, &path);
            Ok(Delivered::File { path, reference })
        }
        OutputMode::Inline => Ok(Delivered::Inline {
            data_url: image.to_data_url(),
        }),
    }
}

/// Writes the image without clobbering: a same-millisecond name gets a suffix.
pub fn persist(image: &ImagePayload, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let stamp = chrono::Utc::now().timestamp_millis();
    let ext = image.extension();
    for idx in 0u32.. {
        let name = if idx == 0 {
            format!("tryon-{stamp}.{ext}")
        } else {
            format!("tryon-{stamp}-{idx}.{ext}")
        };
        let path = dir.join(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", path.display()))
            }
        };
        file.write_all(image.bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(path);
    }
    anyhow::bail!("no free output file name under {}", dir.display())
}

/// `/<dir name>/<file name>`, the path a static file server would expose.
fn reference_for(dir: &Path, path: &Path) -> String {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    match dir.file_name() {
        Some(dir_name) => format!("/{}/{file}", dir_name.to_string_lossy()),
        None => format!("/{file}"),
    }
}
