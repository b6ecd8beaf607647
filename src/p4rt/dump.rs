use log::debug;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends a human readable copy of every outgoing P4Runtime request to a
/// file. The file is truncated when the dump is opened.
pub struct RequestDump {
    path: PathBuf,
    file: Mutex<File>,
}

impl RequestDump {
    pub fn open(path: &Path) -> std::io::Result<RequestDump> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        debug!(target: "core", "dumping requests to {:?}", path);
        Ok(RequestDump {
            path: path.to_owned(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record<M: Debug>(&self, rpc: &str, request: &M) -> std::io::Result<()> {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let mut file = self.file.lock();
        write!(file, "\n[{}] /p4.v1.P4Runtime/{}\n{:#?}\n", now, rpc, request)?;
        file.flush()
    }
}
