//! File-backed parameter store
//!
//! One file per key inside a directory. Reads go straight to disk; writes are
//! handed to a background writer thread so the decode loop never waits on I/O.

use anyhow::{Context, Result};
use can_state_decoder::params::{parse_bool, ParamStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Queued write: key and value
type WriteRequest = (String, String);

pub struct FileParamStore {
    dir: PathBuf,
    sender: Option<Sender<WriteRequest>>,
    writer: Option<JoinHandle<()>>,
}

impl FileParamStore {
    /// Open (creating if needed) the store at `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create parameter directory: {:?}", dir))?;

        let (sender, receiver) = mpsc::channel::<WriteRequest>();
        let writer_dir = dir.to_path_buf();
        let writer = thread::Builder::new()
            .name("param-writer".to_string())
            .spawn(move || {
                for (key, value) in receiver {
                    if let Err(e) = write_atomic(&writer_dir, &key, &value) {
                        log::warn!("Failed to write parameter '{}': {:#}", key, e);
                    }
                }
            })
            .context("Failed to spawn parameter writer")?;

        log::debug!("Parameter store opened at {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            sender: Some(sender),
            writer: Some(writer),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

/// Write through a temporary file so readers never see a partial value
fn write_atomic(dir: &Path, key: &str, value: &str) -> Result<()> {
    let tmp = dir.join(format!(".{}.tmp", key));
    fs::write(&tmp, value).with_context(|| format!("Failed to write {:?}", tmp))?;
    fs::rename(&tmp, dir.join(key))
        .with_context(|| format!("Failed to move {:?} into place", tmp))?;
    Ok(())
}

impl ParamStore for FileParamStore {
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).map(|value| parse_bool(&value)).unwrap_or(false)
    }

    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path(key)).ok()
    }

    fn put_nonblocking(&self, key: &str, value: String) {
        let request = (key.to_string(), value);
        let sent = self.sender.as_ref().is_some_and(|sender| sender.send(request).is_ok());
        if !sent {
            log::warn!("Parameter writer stopped, dropping write to '{}'", key);
        }
    }
}

impl Drop for FileParamStore {
    /// Flush queued writes before the store goes away
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::warn!("Parameter writer panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_state_decoder::params::{KEY_ACCEL_PROFILE, KEY_SECONDARY_STEER_SENSOR};

    #[test]
    fn test_reads_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(KEY_SECONDARY_STEER_SENSOR), "1").unwrap();

        let store = FileParamStore::open(dir.path()).unwrap();
        assert!(store.get_bool(KEY_SECONDARY_STEER_SENSOR));
        assert!(!store.get_bool("missing"));
    }

    #[test]
    fn test_writes_land_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::open(&dir.path().join("params")).unwrap();
        store.put_nonblocking(KEY_ACCEL_PROFILE, "2".to_string());
        store.put_nonblocking(KEY_ACCEL_PROFILE, "0".to_string());
        drop(store);

        let value = fs::read_to_string(dir.path().join("params").join(KEY_ACCEL_PROFILE)).unwrap();
        assert_eq!(value, "0");
    }
}
