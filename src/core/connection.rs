use crate::error::Result;
use crate::p4rt::pipeconf::Pipeconf;
use crate::proto::p4runtime::TableEntry;
use crate::representation::Switch;
use async_trait::async_trait;

/// The P4Runtime operations the controller issues against one switch.
///
/// A connection is used between a successful [Connector::connect] and
/// [SwitchConnection::shutdown]; nothing is sent after shutdown.
#[async_trait]
pub trait SwitchConnection: Send {
    fn name(&self) -> &str;

    /// Sends a MasterArbitrationUpdate on the stream channel and waits for
    /// the switch's answer.
    async fn master_arbitration_update(&mut self) -> Result<()>;

    /// Pushes P4Info plus the compiled device config (VERIFY_AND_COMMIT).
    async fn set_forwarding_pipeline_config(&mut self, pipeconf: &dyn Pipeconf) -> Result<()>;

    /// One Write with one Update: INSERT, or MODIFY for default-action entries.
    async fn write_table_entry(&mut self, table_entry: TableEntry) -> Result<()>;

    /// Reads back every table entry on the switch.
    async fn read_table_entries(&mut self) -> Result<Vec<TableEntry>>;

    /// Closes the stream channel. Safe to call more than once.
    async fn shutdown(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: SwitchConnection + 'static;

    async fn connect(&self, switch: &Switch) -> Result<Self::Connection>;
}
