use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{create_dir_all, rename, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::err::Error;

/// Encodes `value` and replaces the file at `path` with it. The bytes go to a
/// sibling temp file first so a crash mid-write leaves the old file intact.
pub async fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).await?;
        }
    }
    let bytes = postcard::to_allocvec(value)?;
    let tmp = temp_path(path);
    let mut file = File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    rename(&tmp, path).await?;
    Ok(())
}

/// `None` when nothing has been written to `path` yet.
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    if !path.exists() {
        return Ok(None);
    }
    let mut bytes = Vec::new();
    BufReader::new(File::open(path).await?)
        .read_to_end(&mut bytes)
        .await?;
    Ok(Some(postcard::from_bytes(&bytes)?))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
