use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// A switch the controller talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    pub name: String,
    /// `host:port` of the P4Runtime gRPC server.
    pub address: String,
    /// P4Runtime device id.
    pub device_id: u64,
    /// Every request sent to this switch is appended here when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto_dump_file: Option<PathBuf>,
}

impl Switch {
    pub fn new(name: &str, address: &str, device_id: u64) -> Switch {
        Switch {
            name: name.to_owned(),
            address: address.to_owned(),
            device_id,
            proto_dump_file: None,
        }
    }

    pub fn with_dump_file<P: Into<PathBuf>>(mut self, path: P) -> Switch {
        self.proto_dump_file = Some(path.into());
        self
    }
}

impl Display for Switch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}#{}", self.name, self.address, self.device_id)
    }
}
