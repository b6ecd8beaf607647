use crate::error::PipeconfError;
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::pure::build_table_entry;
use crate::proto::p4runtime::TableEntry;
use crate::util::value::{InnerValue, Value};
use std::fmt::{Display, Formatter};

/// A table entry described by names, resolved against P4Info only when it
/// is turned into a [TableEntry].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flow {
    pub table: FlowTable,
    pub action: FlowAction,
    pub priority: i32,
    pub default_action: bool,
}

impl Flow {
    pub fn to_table_entry<T>(&self, pipeconf: &T) -> Result<TableEntry, PipeconfError>
    where
        T: Pipeconf + ?Sized,
    {
        build_table_entry(
            pipeconf.get_p4info(),
            &self.table.name,
            &self.table.matches,
            self.default_action,
            &self.action.name,
            &self.action.params,
            self.priority,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowTable {
    pub name: String,
    pub matches: Vec<FlowMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub name: String,
    pub value: InnerValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowAction {
    pub name: String,
    pub params: Vec<FlowActionParam>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowActionParam {
    pub name: String,
    pub value: Value,
}

impl Display for InnerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InnerValue::Exact(v) => write!(f, "{}", v),
            InnerValue::Lpm(v, len) => write!(f, "{}/{}", v, len),
            InnerValue::Ternary(v, mask) => write!(f, "{}&&&{}", v, mask),
            InnerValue::Range(low, high) => write!(f, "{}..{}", low, high),
            InnerValue::Optional(v) => write!(f, "{}?", v),
        }
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.table.name)?;
        for (i, m) in self.table.matches.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", m.name, m.value)?;
        }
        write!(f, ") -> {}(", self.action.name)?;
        for (i, p) in self.action.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", p.name, p.value)?;
        }
        write!(f, ")")?;
        if self.default_action {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}
