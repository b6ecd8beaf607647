use std::fmt::{Display, Formatter};
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

/// Where a failing RPC was issued from, captured at the call site.
#[derive(Copy, Clone, Debug)]
pub struct CallSite(pub &'static Location<'static>);

impl CallSite {
    #[track_caller]
    pub fn here() -> Self {
        CallSite(Location::caller())
    }
}

impl Display for CallSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0.file(), self.0.line())
    }
}

/// One entry of the per-update error list a switch packs into the status
/// details of a failed `Write`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateError {
    pub index: usize,
    pub canonical_code: i32,
    pub message: String,
}

/// The canonical gRPC name of `code`, as in `google.rpc.Code`.
pub fn code_name(code: tonic::Code) -> &'static str {
    use tonic::Code::*;
    match code {
        Ok => "OK",
        Cancelled => "CANCELLED",
        Unknown => "UNKNOWN",
        InvalidArgument => "INVALID_ARGUMENT",
        DeadlineExceeded => "DEADLINE_EXCEEDED",
        NotFound => "NOT_FOUND",
        AlreadyExists => "ALREADY_EXISTS",
        PermissionDenied => "PERMISSION_DENIED",
        ResourceExhausted => "RESOURCE_EXHAUSTED",
        FailedPrecondition => "FAILED_PRECONDITION",
        Aborted => "ABORTED",
        OutOfRange => "OUT_OF_RANGE",
        Unimplemented => "UNIMPLEMENTED",
        Internal => "INTERNAL",
        Unavailable => "UNAVAILABLE",
        DataLoss => "DATA_LOSS",
        Unauthenticated => "UNAUTHENTICATED",
        __NonExhaustive => unreachable!("Code::__NonExhaustive"),
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("gRPC Error: {} ({}) [{}]", status.message(), code_name(status.code()), location)]
    DeviceGrpcError {
        device: String,
        rpc: &'static str,
        status: tonic::Status,
        location: CallSite,
        updates: Vec<UpdateError>,
    },
    /// The channel to the switch could not be opened.
    #[error("gRPC Error: {} (UNAVAILABLE) [{}]", detail, location)]
    DeviceGrpcTransportError {
        device: String,
        detail: String,
        location: CallSite,
        error: tonic::transport::Error,
    },
    #[error("Device {} stream channel closed before {}", device, during)]
    StreamClosed { device: String, during: &'static str },
    #[error("Master not acquired on {}, {}", device, reason)]
    NotMaster { device: String, reason: String },
    #[error("Device {} cannot write request dump {:?}: {}", device, path, error)]
    DumpFile {
        device: String,
        path: PathBuf,
        error: std::io::Error,
    },
}

impl DeviceError {
    /// Wraps a failed RPC, recording the caller's source location.
    #[track_caller]
    pub fn grpc(device: &str, rpc: &'static str, status: tonic::Status) -> Self {
        let updates = crate::p4rt::pure::decode_update_errors(&status);
        DeviceError::DeviceGrpcError {
            device: device.to_owned(),
            rpc,
            status,
            location: CallSite::here(),
            updates,
        }
    }

    /// Wraps a failed connect. `detail` joins the error's source chain.
    #[track_caller]
    pub fn transport(device: &str, error: tonic::transport::Error) -> Self {
        let mut detail = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !detail.contains(&cause_text) {
                detail.push_str(": ");
                detail.push_str(&cause_text);
            }
            source = cause.source();
        }
        DeviceError::DeviceGrpcTransportError {
            device: device.to_owned(),
            detail,
            location: CallSite::here(),
            error,
        }
    }

    /// Failures of a remote call, as opposed to local I/O.
    pub fn is_rpc_failure(&self) -> bool {
        !matches!(self, DeviceError::DumpFile { .. })
    }
}

#[derive(Error, Debug)]
pub enum PipeconfError {
    #[error("Opening P4 info file {:?} failed: {}", path, error)]
    P4InfoFile {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Decoding binary P4 info {:?} failed: {}", path, error)]
    P4InfoDecode {
        path: PathBuf,
        error: prost::DecodeError,
    },
    #[error("Parsing text P4 info {:?} failed: {}", path, error)]
    P4InfoText {
        path: PathBuf,
        error: crate::p4rt::text_format::TextFormatError,
    },
    #[error("Device config file {:?} error: {}", path, error)]
    DeviceConfigFile {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("table '{}' not found in P4 info", .0)]
    TableNotFound(String),
    #[error("action '{}' not found in P4 info", .0)]
    ActionNotFound(String),
    #[error("match field '{}' not found in table '{}'", field, table)]
    MatchFieldNotFound { table: String, field: String },
    #[error("param '{}' not found in action '{}'", param, action)]
    ActionParamNotFound { action: String, param: String },
    #[error("match field '{}' is {} but got a {} value", field, expected, got)]
    MatchKindMismatch {
        field: String,
        expected: String,
        got: &'static str,
    },
    #[error("cannot encode '{}': {}", name, reason)]
    Encode { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Rule set file {:?} error: {}", path, error)]
    File {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Rule set file {:?} is not valid: {}", path, error)]
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("entry #{} targets undeclared switch '{}'", index, switch)]
    UndeclaredSwitch { index: usize, switch: String },
    #[error("switch '{}' declared twice", .0)]
    DuplicateSwitch(String),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Interrupted by user")]
    Interrupted,
    #[error("Switch '{}' is not connected", .0)]
    UnknownSwitch(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Pipeconf(#[from] PipeconfError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_errors_print_canonical_code_and_call_site() {
        let line = line!() + 1;
        let err = DeviceError::grpc("s1", "Write", tonic::Status::already_exists("dup"));
        assert_eq!(
            err.to_string(),
            format!("gRPC Error: dup (ALREADY_EXISTS) [{}:{}]", file!(), line)
        );
        assert!(err.is_rpc_failure());
    }

    #[test]
    fn every_code_has_a_canonical_name() {
        assert_eq!(code_name(tonic::Code::Ok), "OK");
        assert_eq!(code_name(tonic::Code::Unavailable), "UNAVAILABLE");
        assert_eq!(code_name(tonic::Code::InvalidArgument), "INVALID_ARGUMENT");
        assert_eq!(code_name(tonic::Code::from_i32(6)), "ALREADY_EXISTS");
    }
}
