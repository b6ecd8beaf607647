//! A P4Runtime controller for bmv2 `simple_switch_grpc`: it connects to a
//! fixed set of switches, becomes master, pushes a pipeline and installs an
//! ordered list of table entries.

#[macro_use]
pub mod exported_macro;
pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod p4rt;
pub mod proto;
pub mod representation;
pub mod util;

pub use crate::config::RuleSet;
pub use crate::core::Controller;
pub use crate::error::{ControllerError, Result};
