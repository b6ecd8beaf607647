use crate::config::RuleSet;
use crate::error::{ControllerError, DeviceError, Result};
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::pure::{get_action_name, get_table_name};
use crate::proto::p4config::P4Info;
use crate::proto::p4runtime::{table_action, TableEntry};
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;

pub mod connection;

use connection::{Connector, SwitchConnection};

/// Drives the whole configuration sequence against a set of switches.
///
/// Connections are kept in the order they were opened. Whatever happens
/// during [Controller::run_until], every opened connection is shut down
/// before it returns.
pub struct Controller<C: Connector> {
    connector: C,
    pipeconf: Arc<dyn Pipeconf>,
    connections: Vec<C::Connection>,
}

impl<C: Connector> Controller<C> {
    pub fn new<P: Pipeconf + 'static>(connector: C, pipeconf: P) -> Self {
        Controller {
            connector,
            pipeconf: Arc::new(pipeconf),
            connections: vec![],
        }
    }

    pub fn connections(&self) -> &[C::Connection] {
        &self.connections
    }

    fn connection_mut(&mut self, name: &str) -> Result<&mut C::Connection> {
        self.connections
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| ControllerError::UnknownSwitch(name.to_owned()))
    }

    /// Connect, arbitrate, push the pipeline, write every entry in order,
    /// then read the tables back. Stops at the first failure.
    pub async fn run(&mut self, rule_set: &RuleSet) -> Result<()> {
        rule_set.validate()?;
        let mut table_entries = Vec::with_capacity(rule_set.entries.len());
        for e in &rule_set.entries {
            table_entries.push((e, e.flow.to_table_entry(&self.pipeconf)?));
        }

        for switch in &rule_set.switches {
            let connection = self.connector.connect(switch).await?;
            debug!(target: "core", "opened {}", switch);
            self.connections.push(connection);
        }

        for connection in self.connections.iter_mut() {
            connection.master_arbitration_update().await?;
        }

        for connection in self.connections.iter_mut() {
            connection
                .set_forwarding_pipeline_config(self.pipeconf.as_ref())
                .await?;
            info!(target: "core",
                "Installed P4 Program using SetForwardingPipelineConfig on {}",
                connection.name()
            );
        }

        for (e, table_entry) in table_entries {
            self.connection_mut(&e.switch)?
                .write_table_entry(table_entry)
                .await?;
            info!(target: "core", "Installed rule on {}: {}", e.switch, e.flow);
        }

        for connection in self.connections.iter_mut() {
            let entries = connection.read_table_entries().await?;
            log_table_entries(self.pipeconf.get_p4info(), connection.name(), &entries);
        }

        Ok(())
    }

    /// Closes every opened connection, in open order.
    pub async fn shutdown_all(&mut self) {
        for connection in self.connections.iter_mut() {
            connection.shutdown().await;
        }
        self.connections.clear();
    }

    /// Runs the sequence until it finishes, fails or `interrupt` resolves,
    /// then shuts every connection down.
    pub async fn run_until<F>(&mut self, rule_set: &RuleSet, interrupt: F) -> Result<()>
    where
        F: Future,
    {
        let result = tokio::select! {
            r = self.run(rule_set) => r,
            _ = interrupt => Err(ControllerError::Interrupted),
        };
        match &result {
            Ok(()) => {}
            Err(ControllerError::Interrupted) => info!(target: "core", " Shutting down."),
            Err(e) => report_error(e),
        }
        self.shutdown_all().await;
        result
    }
}

fn report_error(e: &ControllerError) {
    error!(target: "core", "{}", e);
    if let ControllerError::Device(DeviceError::DeviceGrpcError {
        device, rpc, updates, ..
    }) = e
    {
        debug!(target: "core", "{} failed on {}", rpc, device);
        for u in updates {
            error!(target: "core",
                "  update #{}: {} (canonical code {})",
                u.index, u.message, u.canonical_code
            );
        }
    }
}

fn action_id(entry: &TableEntry) -> Option<u32> {
    match entry.action.as_ref()?.r#type.as_ref()? {
        table_action::Type::Action(a) => Some(a.action_id),
        _ => None,
    }
}

fn log_table_entries(p4info: &P4Info, switch: &str, entries: &[TableEntry]) {
    info!(target: "core", "----- Reading tables rules for {} -----", switch);
    for entry in entries {
        let table = get_table_name(p4info, entry.table_id).unwrap_or("<unknown table>");
        let action = action_id(entry)
            .and_then(|id| get_action_name(p4info, id))
            .unwrap_or("<no action>");
        info!(target: "core", "{} -> {}\n{:#?}\n-----", table, action, entry);
    }
}
