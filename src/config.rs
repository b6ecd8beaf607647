//! Rule sets: the switches to configure and the ordered list of entries to
//! install on them.
//!
//! On disk a rule set is JSON:
//!
//! ```json
//! {
//!   "switches": [
//!     {"name": "s1", "address": "127.0.0.1:50051", "device_id": 0,
//!      "proto_dump_file": "logs/s1-p4runtime-requests.txt"}
//!   ],
//!   "entries": [
//!     {"switch": "s1", "table": "MyIngress.ecmp_group",
//!      "match": {"hdr.ipv4.dstAddr": {"lpm": ["10.0.0.1", 32]}},
//!      "action": "MyIngress.set_ecmp_select",
//!      "params": {"ecmp_base": 0, "ecmp_count": 2}}
//!   ]
//! }
//! ```
//!
//! Entries are written in file order. Match fields and params keep their
//! file order too.

use crate::error::ConfigError;
use crate::representation::Switch;
use crate::util::flow::{Flow, FlowAction, FlowActionParam, FlowMatch, FlowTable};
use crate::util::value::{InnerValue, Value};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub switch: String,
    pub flow: Flow,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    pub switches: Vec<Switch>,
    pub entries: Vec<Entry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleSet {
    switches: Vec<Switch>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    switch: String,
    table: String,
    #[serde(rename = "match", default)]
    matches: serde_json::Map<String, serde_json::Value>,
    action: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    default_action: bool,
}

impl RawEntry {
    fn into_entry(self) -> Result<Entry, serde_json::Error> {
        let mut matches = Vec::with_capacity(self.matches.len());
        for (name, value) in self.matches {
            matches.push(FlowMatch {
                name,
                value: serde_json::from_value::<InnerValue>(value)?,
            });
        }
        let mut params = Vec::with_capacity(self.params.len());
        for (name, value) in self.params {
            params.push(FlowActionParam {
                name,
                value: serde_json::from_value::<Value>(value)?,
            });
        }
        Ok(Entry {
            switch: self.switch,
            flow: Flow {
                table: FlowTable {
                    name: self.table,
                    matches,
                },
                action: FlowAction {
                    name: self.action,
                    params,
                },
                priority: self.priority,
                default_action: self.default_action,
            },
        })
    }
}

impl RuleSet {
    pub fn from_json(text: &str) -> Result<RuleSet, serde_json::Error> {
        let raw: RawRuleSet = serde_json::from_str(text)?;
        let mut entries = Vec::with_capacity(raw.entries.len());
        for e in raw.entries {
            entries.push(e.into_entry()?);
        }
        Ok(RuleSet {
            switches: raw.switches,
            entries,
        })
    }

    /// Reads and validates a rule-set file.
    pub fn load(path: &Path) -> Result<RuleSet, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::File {
            path: path.to_owned(),
            error,
        })?;
        let rule_set = RuleSet::from_json(&text).map_err(|error| ConfigError::Json {
            path: path.to_owned(),
            error,
        })?;
        rule_set.validate()?;
        Ok(rule_set)
    }

    /// Switch names are unique and every entry targets a declared switch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for s in &self.switches {
            if !names.insert(s.name.as_str()) {
                return Err(ConfigError::DuplicateSwitch(s.name.clone()));
            }
        }
        for (index, e) in self.entries.iter().enumerate() {
            if !names.contains(e.switch.as_str()) {
                return Err(ConfigError::UndeclaredSwitch {
                    index,
                    switch: e.switch.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn entries_for<'a>(&'a self, switch: &'a str) -> impl Iterator<Item = &'a Flow> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.switch == switch)
            .map(|e| &e.flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::value::{exact, lpm};

    const RULES: &str = r#"{
        "switches": [
            {"name": "s1", "address": "127.0.0.1:50051", "device_id": 0,
             "proto_dump_file": "logs/s1-p4runtime-requests.txt"},
            {"name": "s2", "address": "127.0.0.1:50052", "device_id": 1}
        ],
        "entries": [
            {"switch": "s2", "table": "MyIngress.ecmp_nhop",
             "match": {"meta.ecmp_select": {"exact": 0}},
             "action": "MyIngress.set_nhop",
             "params": {"port": 1, "nhop_dmac": "00:00:00:00:02:02", "nhop_ipv4": "10.0.2.2"}},
            {"switch": "s1", "table": "MyIngress.ecmp_group",
             "match": {"hdr.ipv4.dstAddr": {"lpm": ["10.0.0.1", 32]}},
             "action": "MyIngress.set_ecmp_select",
             "params": {"ecmp_base": 0, "ecmp_count": 2}}
        ]
    }"#;

    #[test]
    fn parse_keeps_order() {
        let rules = RuleSet::from_json(RULES).unwrap();
        rules.validate().unwrap();
        assert_eq!(
            rules.switches[0].proto_dump_file.as_deref(),
            Some(Path::new("logs/s1-p4runtime-requests.txt"))
        );
        assert_eq!(rules.switches[1].proto_dump_file, None);
        assert_eq!(rules.entries[0].switch, "s2");
        assert_eq!(rules.entries[1].switch, "s1");

        let params: Vec<&str> = rules.entries[0]
            .flow
            .action
            .params
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(params, vec!["port", "nhop_dmac", "nhop_ipv4"]);
        assert_eq!(rules.entries[0].flow.table.matches[0].value, exact(0u32));
        assert_eq!(rules.entries[1].flow.table.matches[0].value, lpm("10.0.0.1", 32));
        assert_eq!(rules.entries_for("s1").count(), 1);
    }

    #[test]
    fn reject_undeclared_and_duplicate_switches() {
        let mut rules = RuleSet::from_json(RULES).unwrap();
        rules.entries[1].switch = "s3".to_owned();
        assert!(matches!(
            rules.validate(),
            Err(ConfigError::UndeclaredSwitch { index: 1, .. })
        ));

        let mut rules = RuleSet::from_json(RULES).unwrap();
        let dup = rules.switches[0].clone();
        rules.switches.push(dup);
        assert!(matches!(rules.validate(), Err(ConfigError::DuplicateSwitch(_))));
    }

    #[test]
    fn reject_malformed_match_values() {
        let text = r#"{"switches": [], "entries": [
            {"switch": "s1", "table": "t", "match": {"f": {"fuzzy": 1}}, "action": "a"}
        ]}"#;
        assert!(RuleSet::from_json(text).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            RuleSet::load(Path::new("no/such/rules.json")),
            Err(ConfigError::File { .. })
        ));
    }
}
