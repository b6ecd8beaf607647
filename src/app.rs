//! The built-in rule sets, one per P4 program.

use crate::config::{Entry, RuleSet};
use crate::representation::Switch;
use crate::util::flow::Flow;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub mod load_balance;
pub mod qos;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Program {
    LoadBalance,
    Qos,
}

impl Program {
    pub const NAMES: &'static [&'static str] = &["load_balance", "qos"];

    pub fn name(&self) -> &'static str {
        match self {
            Program::LoadBalance => "load_balance",
            Program::Qos => "qos",
        }
    }

    /// Where `make` leaves the P4Info for this program.
    pub fn default_p4info_path(&self) -> PathBuf {
        PathBuf::from(format!("./build/{}.p4.p4info.txt", self.name()))
    }

    /// Where `make` leaves the compiled BMv2 JSON for this program.
    pub fn default_bmv2_json_path(&self) -> PathBuf {
        PathBuf::from(format!("./build/{}.json", self.name()))
    }

    pub fn rule_set(&self) -> RuleSet {
        match self {
            Program::LoadBalance => load_balance::rule_set(),
            Program::Qos => qos::rule_set(),
        }
    }
}

impl FromStr for Program {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load_balance" => Ok(Program::LoadBalance),
            "qos" => Ok(Program::Qos),
            other => Err(format!("unknown program '{}'", other)),
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// s1..s3 on the local bmv2 ports, dumping requests under `logs/`.
pub fn default_switches() -> Vec<Switch> {
    (1..=3u64)
        .map(|i| {
            Switch::new(
                &format!("s{}", i),
                &format!("127.0.0.1:{}", 50050 + i),
                i - 1,
            )
            .with_dump_file(format!("logs/s{}-p4runtime-requests.txt", i))
        })
        .collect()
}

fn entry(switch: &str, flow: Flow) -> Entry {
    Entry {
        switch: switch.to_owned(),
        flow,
    }
}
