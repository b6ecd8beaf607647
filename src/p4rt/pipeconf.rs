use crate::error::PipeconfError;
use crate::p4rt::text_format;
use crate::proto::p4config::P4Info;
use log::debug;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait Pipeconf: Send + Sync {
    fn get_name(&self) -> &str;
    fn get_p4info(&self) -> &P4Info;
    fn get_bmv2_file_path(&self) -> &Path;
}

impl<T> Pipeconf for Arc<T>
where
    T: Pipeconf + ?Sized,
{
    fn get_name(&self) -> &str {
        self.as_ref().get_name()
    }

    fn get_p4info(&self) -> &P4Info {
        self.as_ref().get_p4info()
    }

    fn get_bmv2_file_path(&self) -> &Path {
        self.as_ref().get_bmv2_file_path()
    }
}

/// How a P4Info file is encoded on disk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum P4InfoFormat {
    Binary,
    Text,
}

impl P4InfoFormat {
    /// `p4c` writes `*.p4info.txt` for text and `*.p4info.bin` for binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") | Some("pbtxt") | Some("textproto") => P4InfoFormat::Text,
            _ => P4InfoFormat::Binary,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DefaultPipeconf {
    name: String,
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    p4info: P4Info,
    bmv2_json_file_path: PathBuf,
}

impl DefaultPipeconf {
    pub fn new<T: AsRef<Path> + Debug>(
        name: &str,
        p4info_file_path: T,
        bmv2_file_path: T,
    ) -> Result<DefaultPipeconf, PipeconfError> {
        let p4info = load_p4info(p4info_file_path.as_ref())?;
        debug!(target: "pipeconf", "loaded {} tables and {} actions from {:?}",
            p4info.tables.len(), p4info.actions.len(), &p4info_file_path);
        Ok(Self::from_p4info(name, p4info, bmv2_file_path))
    }

    pub fn from_p4info<T: AsRef<Path>>(name: &str, p4info: P4Info, bmv2_file_path: T) -> Self {
        DefaultPipeconf {
            name: name.to_owned(),
            inner: Arc::new(Inner {
                p4info,
                bmv2_json_file_path: PathBuf::from(bmv2_file_path.as_ref()),
            }),
        }
    }
}

impl Pipeconf for DefaultPipeconf {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_p4info(&self) -> &P4Info {
        &self.inner.p4info
    }

    fn get_bmv2_file_path(&self) -> &Path {
        &self.inner.bmv2_json_file_path
    }
}

pub fn load_p4info(path: &Path) -> Result<P4Info, PipeconfError> {
    let buf = std::fs::read(path).map_err(|error| PipeconfError::P4InfoFile {
        path: path.to_owned(),
        error,
    })?;
    match P4InfoFormat::from_path(path) {
        P4InfoFormat::Binary => {
            prost::Message::decode(buf.as_ref()).map_err(|error| PipeconfError::P4InfoDecode {
                path: path.to_owned(),
                error,
            })
        }
        P4InfoFormat::Text => {
            let text = String::from_utf8_lossy(&buf);
            text_format::parse_p4info(&text).map_err(|error| PipeconfError::P4InfoText {
                path: path.to_owned(),
                error,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            P4InfoFormat::from_path(Path::new("build/qos.p4.p4info.txt")),
            P4InfoFormat::Text
        );
        assert_eq!(
            P4InfoFormat::from_path(Path::new("build/qos.p4.p4info.bin")),
            P4InfoFormat::Binary
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_p4info(Path::new("does/not/exist.p4info.txt")).unwrap_err();
        assert!(matches!(err, PipeconfError::P4InfoFile { .. }));
    }
}
