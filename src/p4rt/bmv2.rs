use crate::core::connection::{Connector, SwitchConnection};
use crate::error::{DeviceError, Result};
use crate::p4rt::dump::RequestDump;
use crate::p4rt::pipeconf::Pipeconf;
use crate::p4rt::pure::{
    new_master_update_request, new_read_table_entries_request,
    new_set_forwarding_pipeline_config_request, new_write_table_entry,
};
use crate::proto::p4runtime::{
    entity, stream_message_response, StreamMessageRequest, StreamMessageResponse, TableEntry,
    Uint128,
};
use crate::proto::P4RuntimeClient;
use crate::representation::Switch;
use async_trait::async_trait;
use log::{debug, warn};
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::sync::mpsc::Sender;

/// A connection to a bmv2 switch using the P4Runtime API.
///
/// To configure a switch:
/// - connect with [Bmv2SwitchConnection::new] and some [Bmv2ConnectionOption].
/// - become master with [Bmv2SwitchConnection::master_arbitration_update]. This
///   opens the bi-directional stream channel, sends the arbitration request and
///   waits for the switch's reply.
/// - push the pipeline, then write entries.
/// - [Bmv2SwitchConnection::shutdown] closes the stream.
pub struct Bmv2SwitchConnection {
    pub name: String,
    pub device_id: u64,
    client: P4RuntimeClient,
    stream_status: Bmv2StreamStatus,
    pub master_status: Bmv2MasterStatus,
    dump: Option<RequestDump>,
}

pub struct Bmv2ConnectionOption {
    /// the device id used in p4runtime
    pub p4_device_id: u64,
    /// the p4runtime election id
    pub master_update: Option<Bmv2MasterUpdateOption>,
    /// where to append a copy of every request
    pub proto_dump_file: Option<PathBuf>,
}

impl Default for Bmv2ConnectionOption {
    fn default() -> Self {
        Self {
            p4_device_id: 0,
            master_update: Some(Bmv2MasterUpdateOption::default()),
            proto_dump_file: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bmv2MasterUpdateOption {
    pub election_id_high: u64,
    pub election_id_low: u64,
}

impl Default for Bmv2MasterUpdateOption {
    fn default() -> Self {
        Bmv2MasterUpdateOption {
            election_id_high: 0,
            election_id_low: 1,
        }
    }
}

impl Bmv2MasterUpdateOption {
    pub fn election_id(&self) -> Uint128 {
        Uint128 {
            high: self.election_id_high,
            low: self.election_id_low,
        }
    }
}

enum Bmv2StreamStatus {
    None,
    Streaming {
        sender: Sender<StreamMessageRequest>,
        receiver: tonic::Streaming<StreamMessageResponse>,
    },
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bmv2MasterStatus {
    NoElect,
    Elect(Bmv2MasterUpdateOption),
    Master(Bmv2MasterUpdateOption),
    NotMaster { reason: String },
}

impl Bmv2MasterStatus {
    pub fn from(option: Option<Bmv2MasterUpdateOption>) -> Self {
        match option {
            Some(o) => Self::Elect(o),
            None => Self::NoElect,
        }
    }
}

impl Bmv2SwitchConnection {
    pub async fn new(
        name: &str,
        address: &str,
        options: Bmv2ConnectionOption,
    ) -> Result<Bmv2SwitchConnection> {
        let dump = match options.proto_dump_file {
            Some(path) => Some(RequestDump::open(&path).map_err(|error| DeviceError::DumpFile {
                device: name.to_owned(),
                path: path.clone(),
                error,
            })?),
            None => None,
        };

        let client = P4RuntimeClient::connect(format!("http://{}", address))
            .await
            .map_err(|error| DeviceError::transport(name, error))?;
        debug!(target: "core", "connected to {} at {}", name, address);

        Ok(Bmv2SwitchConnection {
            name: name.to_owned(),
            device_id: options.p4_device_id,
            client,
            stream_status: Bmv2StreamStatus::None,
            master_status: Bmv2MasterStatus::from(options.master_update),
            dump,
        })
    }

    fn dump<M: Debug>(&self, rpc: &str, request: &M) -> Result<()> {
        if let Some(dump) = &self.dump {
            dump.record(rpc, request)
                .map_err(|error| DeviceError::DumpFile {
                    device: self.name.clone(),
                    path: dump.path().to_owned(),
                    error,
                })?;
        }
        Ok(())
    }

    fn election_option(&self) -> Result<Bmv2MasterUpdateOption> {
        match &self.master_status {
            Bmv2MasterStatus::Elect(o) | Bmv2MasterStatus::Master(o) => Ok(*o),
            _ => Err(DeviceError::NotMaster {
                device: self.name.clone(),
                reason: "No elect".to_owned(),
            }
            .into()),
        }
    }

    /// The election id to put in Write and SetForwardingPipelineConfig.
    pub fn get_master(&self) -> Result<Uint128> {
        match &self.master_status {
            Bmv2MasterStatus::Master(o) => Ok(o.election_id()),
            Bmv2MasterStatus::Elect(_) => Err(DeviceError::NotMaster {
                device: self.name.clone(),
                reason: "Not elected".to_owned(),
            }
            .into()),
            Bmv2MasterStatus::NotMaster { reason } => Err(DeviceError::NotMaster {
                device: self.name.clone(),
                reason: reason.clone(),
            }
            .into()),
            Bmv2MasterStatus::NoElect => Err(DeviceError::NotMaster {
                device: self.name.clone(),
                reason: "No elect".to_owned(),
            }
            .into()),
        }
    }

    /// Sends `request` on the stream channel, opening the channel first if
    /// needed.
    async fn send_stream_request(&mut self, request: StreamMessageRequest) -> Result<()> {
        self.dump("StreamChannel", &request)?;
        match &mut self.stream_status {
            Bmv2StreamStatus::None => {
                let (sender, receiver) = tokio::sync::mpsc::channel(4096);
                sender.send(request).await.map_err(|_| DeviceError::StreamClosed {
                    device: self.name.clone(),
                    during: "arbitration",
                })?;
                let receiver = self
                    .client
                    .stream_channel(tokio_stream::wrappers::ReceiverStream::new(receiver))
                    .await
                    .map_err(|e| DeviceError::grpc(&self.name, "StreamChannel", e))?
                    .into_inner();
                self.stream_status = Bmv2StreamStatus::Streaming { sender, receiver };
            }
            Bmv2StreamStatus::Streaming { sender, .. } => {
                sender.send(request).await.map_err(|_| DeviceError::StreamClosed {
                    device: self.name.clone(),
                    during: "arbitration",
                })?;
            }
            Bmv2StreamStatus::Closed => {
                return Err(DeviceError::StreamClosed {
                    device: self.name.clone(),
                    during: "arbitration",
                }
                .into())
            }
        }
        Ok(())
    }

    async fn next_stream_response(&mut self) -> Result<Option<StreamMessageResponse>> {
        match &mut self.stream_status {
            Bmv2StreamStatus::Streaming { receiver, .. } => Ok(receiver
                .message()
                .await
                .map_err(|e| DeviceError::grpc(&self.name, "StreamChannel", e))?),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SwitchConnection for Bmv2SwitchConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn master_arbitration_update(&mut self) -> Result<()> {
        let option = self.election_option()?;
        let request = new_master_update_request(self.device_id, option);
        self.send_stream_request(request).await?;

        loop {
            let response = match self.next_stream_response().await? {
                Some(r) => r,
                None => {
                    return Err(DeviceError::StreamClosed {
                        device: self.name.clone(),
                        during: "arbitration",
                    }
                    .into())
                }
            };
            match response.update {
                Some(stream_message_response::Update::Arbitration(update)) => {
                    debug!(target: "core",
                        "arbitration reply from {}: {:?}", self.name, update
                    );
                    let (code, message) = update
                        .status
                        .map(|s| (s.code, s.message))
                        .unwrap_or((0, String::new()));
                    self.master_status = if code == 0 {
                        Bmv2MasterStatus::Master(option)
                    } else {
                        warn!(target: "core",
                            "{} is not master: {} ({})", self.name, message, code
                        );
                        Bmv2MasterStatus::NotMaster {
                            reason: format!("{} ({})", message, code),
                        }
                    };
                    return Ok(());
                }
                other => {
                    debug!(target: "core",
                        "ignoring stream message from {}: {:?}", self.name, other
                    );
                }
            }
        }
    }

    async fn set_forwarding_pipeline_config(&mut self, pipeconf: &dyn Pipeconf) -> Result<()> {
        let election_id = self.get_master()?;
        let request = new_set_forwarding_pipeline_config_request(
            pipeconf.get_p4info(),
            pipeconf.get_bmv2_file_path(),
            self.device_id,
            election_id,
        )
        .await?;
        debug!(target: "core", "pushing {} to {}", pipeconf.get_name(), self.name);
        self.dump("SetForwardingPipelineConfig", &request)?;
        self.client
            .set_forwarding_pipeline_config(tonic::Request::new(request))
            .await
            .map_err(|e| DeviceError::grpc(&self.name, "SetForwardingPipelineConfig", e))?;
        Ok(())
    }

    async fn write_table_entry(&mut self, table_entry: TableEntry) -> Result<()> {
        let election_id = self.get_master()?;
        let request = new_write_table_entry(self.device_id, election_id, table_entry);
        self.dump("Write", &request)?;
        self.client
            .write(tonic::Request::new(request))
            .await
            .map_err(|e| DeviceError::grpc(&self.name, "Write", e))?;
        Ok(())
    }

    async fn read_table_entries(&mut self) -> Result<Vec<TableEntry>> {
        let request = new_read_table_entries_request(self.device_id);
        self.dump("Read", &request)?;
        let mut stream = self
            .client
            .read(tonic::Request::new(request))
            .await
            .map_err(|e| DeviceError::grpc(&self.name, "Read", e))?
            .into_inner();
        let mut entries = vec![];
        while let Some(response) = stream
            .message()
            .await
            .map_err(|e| DeviceError::grpc(&self.name, "Read", e))?
        {
            for e in response.entities {
                if let Some(entity::Entity::TableEntry(table_entry)) = e.entity {
                    entries.push(table_entry);
                }
            }
        }
        Ok(entries)
    }

    async fn shutdown(&mut self) {
        if let Bmv2StreamStatus::Streaming { .. } = self.stream_status {
            debug!(target: "core", "closing stream channel of {}", self.name);
        }
        self.stream_status = Bmv2StreamStatus::Closed;
    }
}

/// Opens [Bmv2SwitchConnection]s with one election id for every switch.
#[derive(Clone, Debug, Default)]
pub struct Bmv2Connector {
    pub master_update: Bmv2MasterUpdateOption,
}

#[async_trait]
impl Connector for Bmv2Connector {
    type Connection = Bmv2SwitchConnection;

    async fn connect(&self, switch: &Switch) -> Result<Bmv2SwitchConnection> {
        Bmv2SwitchConnection::new(
            &switch.name,
            &switch.address,
            Bmv2ConnectionOption {
                p4_device_id: switch.device_id,
                master_update: Some(self.master_update),
                proto_dump_file: switch.proto_dump_file.clone(),
            },
        )
        .await
    }
}
