use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rusty_p4_controller::app::Program;
use rusty_p4_controller::core::connection::SwitchConnection;
use rusty_p4_controller::error::{ControllerError, DeviceError};
use rusty_p4_controller::p4rt::bmv2::{
    Bmv2ConnectionOption, Bmv2Connector, Bmv2MasterStatus, Bmv2MasterUpdateOption,
    Bmv2SwitchConnection,
};
use rusty_p4_controller::p4rt::pipeconf::DefaultPipeconf;
use rusty_p4_controller::proto::p4runtime::p4_runtime_server::{P4Runtime, P4RuntimeServer};
use rusty_p4_controller::proto::p4runtime::{
    entity, set_forwarding_pipeline_config_request, stream_message_request,
    stream_message_response, update, Entity, MasterArbitrationUpdate, PacketIn, ReadRequest,
    ReadResponse, SetForwardingPipelineConfigRequest, SetForwardingPipelineConfigResponse,
    StreamMessageRequest, StreamMessageResponse, TableEntry, Uint128, WriteRequest,
    WriteResponse,
};
use rusty_p4_controller::proto::rpc;
use rusty_p4_controller::representation::Switch;
use rusty_p4_controller::{Controller, RuleSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Request, Response, Status, Streaming};

#[derive(Default)]
struct Seen {
    arbitrations: Vec<MasterArbitrationUpdate>,
    pipelines: Vec<SetForwardingPipelineConfigRequest>,
    writes: Vec<WriteRequest>,
    reads: Vec<ReadRequest>,
    installed: Vec<TableEntry>,
}

/// A P4Runtime server that answers like bmv2 does for the calls the
/// controller makes.
#[derive(Clone, Default)]
struct FakeSwitch {
    seen: Arc<Mutex<Seen>>,
    arbitration_code: i32,
    packet_before_reply: bool,
}

impl FakeSwitch {
    fn with_arbitration_code(code: tonic::Code) -> Self {
        FakeSwitch {
            arbitration_code: code as i32,
            ..Default::default()
        }
    }
}

#[async_trait]
impl P4Runtime for FakeSwitch {
    async fn write(
        &self,
        request: Request<WriteRequest>,
    ) -> Result<Response<WriteResponse>, Status> {
        let request = request.into_inner();
        let mut seen = self.seen.lock();
        seen.writes.push(request.clone());
        for u in request.updates {
            if let Some(entity::Entity::TableEntry(entry)) = u.entity.and_then(|e| e.entity) {
                let exists = seen
                    .installed
                    .iter()
                    .any(|e| e.table_id == entry.table_id && e.r#match == entry.r#match);
                if exists && u.r#type == update::Type::Insert as i32 {
                    return Err(Status::already_exists("Match entry exists"));
                }
                seen.installed.push(entry);
            }
        }
        Ok(Response::new(WriteResponse {}))
    }

    type ReadStream = ReceiverStream<Result<ReadResponse, Status>>;

    async fn read(
        &self,
        request: Request<ReadRequest>,
    ) -> Result<Response<Self::ReadStream>, Status> {
        let entities = {
            let mut seen = self.seen.lock();
            seen.reads.push(request.into_inner());
            seen.installed
                .iter()
                .cloned()
                .map(|e| Entity {
                    entity: Some(entity::Entity::TableEntry(e)),
                })
                .collect()
        };
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(ReadResponse { entities }))
            .await
            .map_err(|_| Status::internal("reader gone"))?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn set_forwarding_pipeline_config(
        &self,
        request: Request<SetForwardingPipelineConfigRequest>,
    ) -> Result<Response<SetForwardingPipelineConfigResponse>, Status> {
        self.seen.lock().pipelines.push(request.into_inner());
        Ok(Response::new(SetForwardingPipelineConfigResponse {}))
    }

    type StreamChannelStream = ReceiverStream<Result<StreamMessageResponse, Status>>;

    async fn stream_channel(
        &self,
        request: Request<Streaming<StreamMessageRequest>>,
    ) -> Result<Response<Self::StreamChannelStream>, Status> {
        let mut incoming = request.into_inner();
        let (tx, rx) = mpsc::channel(16);
        let switch = self.clone();
        tokio::spawn(async move {
            while let Ok(Some(message)) = incoming.message().await {
                let update = match message.update {
                    Some(stream_message_request::Update::Arbitration(update)) => update,
                    _ => continue,
                };
                switch.seen.lock().arbitrations.push(update.clone());
                if switch.packet_before_reply {
                    let packet = StreamMessageResponse {
                        update: Some(stream_message_response::Update::Packet(PacketIn {
                            payload: Bytes::from_static(&[0xde, 0xad]),
                            ..Default::default()
                        })),
                    };
                    if tx.send(Ok(packet)).await.is_err() {
                        break;
                    }
                }
                let reply = MasterArbitrationUpdate {
                    status: Some(rpc::Status {
                        code: switch.arbitration_code,
                        message: "arbitration".to_owned(),
                        details: vec![],
                    }),
                    ..update
                };
                let reply = StreamMessageResponse {
                    update: Some(stream_message_response::Update::Arbitration(reply)),
                };
                if tx.send(Ok(reply)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn serve(switch: FakeSwitch) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(P4RuntimeServer::new(switch))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

fn data(file: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), file)
}

fn qos_pipeconf() -> DefaultPipeconf {
    DefaultPipeconf::new("qos", data("qos.p4info.txt"), data("bmv2.json")).unwrap()
}

fn s1_qos_entries(pipeconf: &DefaultPipeconf) -> Vec<TableEntry> {
    Program::Qos
        .rule_set()
        .entries
        .iter()
        .filter(|e| e.switch == "s1")
        .map(|e| e.flow.to_table_entry(pipeconf).unwrap())
        .collect()
}

async fn connect(addr: SocketAddr, dump: Option<PathBuf>) -> Bmv2SwitchConnection {
    Bmv2SwitchConnection::new(
        "s1",
        &addr.to_string(),
        Bmv2ConnectionOption {
            p4_device_id: 1,
            master_update: Some(Bmv2MasterUpdateOption::default()),
            proto_dump_file: dump,
        },
    )
    .await
    .unwrap()
}

fn default_election_id() -> Option<Uint128> {
    Some(Uint128 { high: 0, low: 1 })
}

#[tokio::test]
async fn arbitration_skips_other_stream_messages() {
    let switch = FakeSwitch {
        packet_before_reply: true,
        ..Default::default()
    };
    let addr = serve(switch.clone()).await;
    let mut connection = connect(addr, None).await;

    connection.master_arbitration_update().await.unwrap();
    assert_eq!(
        connection.master_status,
        Bmv2MasterStatus::Master(Bmv2MasterUpdateOption::default())
    );
    let seen = switch.seen.lock();
    assert_eq!(seen.arbitrations.len(), 1);
    assert_eq!(seen.arbitrations[0].device_id, 1);
    assert_eq!(seen.arbitrations[0].election_id, default_election_id());
}

#[tokio::test]
async fn master_connection_carries_election_id_in_every_request() {
    let switch = FakeSwitch::default();
    let addr = serve(switch.clone()).await;
    let mut connection = connect(addr, None).await;
    let pipeconf = qos_pipeconf();
    let entries = s1_qos_entries(&pipeconf);

    connection.master_arbitration_update().await.unwrap();
    connection
        .set_forwarding_pipeline_config(&pipeconf)
        .await
        .unwrap();
    for entry in entries.clone() {
        connection.write_table_entry(entry).await.unwrap();
    }
    let read_back = connection.read_table_entries().await.unwrap();
    connection.shutdown().await;

    assert_eq!(read_back, entries);
    let seen = switch.seen.lock();
    let pipeline = &seen.pipelines[0];
    assert_eq!(pipeline.device_id, 1);
    assert_eq!(pipeline.election_id, default_election_id());
    assert_eq!(
        pipeline.action,
        set_forwarding_pipeline_config_request::Action::VerifyAndCommit as i32
    );
    let config = pipeline.config.as_ref().unwrap();
    assert_eq!(
        config.p4_device_config.as_ref(),
        std::fs::read(data("bmv2.json")).unwrap().as_slice()
    );
    assert_eq!(seen.writes.len(), entries.len());
    for w in &seen.writes {
        assert_eq!(w.device_id, 1);
        assert_eq!(w.election_id, default_election_id());
        assert_eq!(w.updates[0].r#type, update::Type::Insert as i32);
    }
    match &seen.reads[0].entities[0].entity {
        Some(entity::Entity::TableEntry(e)) => assert_eq!(e.table_id, 0),
        other => panic!("unexpected read entity {:?}", other),
    }
}

#[tokio::test]
async fn refused_mastership_blocks_pipeline_and_writes() {
    let switch = FakeSwitch::with_arbitration_code(tonic::Code::AlreadyExists);
    let addr = serve(switch.clone()).await;
    let mut connection = connect(addr, None).await;
    let pipeconf = qos_pipeconf();

    connection.master_arbitration_update().await.unwrap();
    assert!(matches!(
        connection.master_status,
        Bmv2MasterStatus::NotMaster { .. }
    ));

    let err = connection
        .set_forwarding_pipeline_config(&pipeconf)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Device(DeviceError::NotMaster { .. })));
    let entry = s1_qos_entries(&pipeconf).remove(0);
    let err = connection.write_table_entry(entry).await.unwrap_err();
    assert!(matches!(err, ControllerError::Device(DeviceError::NotMaster { .. })));

    let seen = switch.seen.lock();
    assert_eq!(seen.arbitrations.len(), 1);
    assert!(seen.pipelines.is_empty());
    assert!(seen.writes.is_empty());
}

#[tokio::test]
async fn duplicate_insert_is_reported_with_canonical_code() {
    let addr = serve(FakeSwitch::default()).await;
    let mut connection = connect(addr, None).await;
    let entry = s1_qos_entries(&qos_pipeconf()).remove(0);

    connection.master_arbitration_update().await.unwrap();
    connection.write_table_entry(entry.clone()).await.unwrap();
    let err = connection.write_table_entry(entry).await.unwrap_err();
    match &err {
        ControllerError::Device(DeviceError::DeviceGrpcError { device, rpc, .. }) => {
            assert_eq!(device, "s1");
            assert_eq!(*rpc, "Write");
        }
        other => panic!("unexpected error {:?}", other),
    }
    let message = err.to_string();
    assert!(
        message.starts_with("gRPC Error: Match entry exists (ALREADY_EXISTS) [src/p4rt/bmv2.rs:"),
        "{}",
        message
    );
}

#[tokio::test]
async fn every_request_is_dumped_in_order() {
    let dir = std::env::temp_dir().join(format!("bmv2-dump-{}", std::process::id()));
    let dump = dir.join("logs").join("s1-p4runtime-requests.txt");
    let addr = serve(FakeSwitch::default()).await;
    let mut connection = connect(addr, Some(dump.clone())).await;
    let pipeconf = qos_pipeconf();
    let entry = s1_qos_entries(&pipeconf).remove(0);

    connection.master_arbitration_update().await.unwrap();
    connection
        .set_forwarding_pipeline_config(&pipeconf)
        .await
        .unwrap();
    connection.write_table_entry(entry).await.unwrap();
    connection.read_table_entries().await.unwrap();
    connection.shutdown().await;

    let text = std::fs::read_to_string(&dump).unwrap();
    let position = |rpc: &str| {
        text.find(&format!("/p4.v1.P4Runtime/{}\n", rpc))
            .unwrap_or_else(|| panic!("no {} record in {}", rpc, text))
    };
    assert!(position("StreamChannel") < position("SetForwardingPipelineConfig"));
    assert!(position("SetForwardingPipelineConfig") < position("Write"));
    assert!(position("Write") < position("Read"));
    assert!(text.contains("election_id: Some("));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn controller_configures_a_live_switch() {
    let switch = FakeSwitch::default();
    let addr = serve(switch.clone()).await;
    let pipeconf = qos_pipeconf();
    let expected = s1_qos_entries(&pipeconf);
    let rules = RuleSet {
        switches: vec![Switch::new("s1", &addr.to_string(), 0)],
        entries: Program::Qos
            .rule_set()
            .entries
            .into_iter()
            .filter(|e| e.switch == "s1")
            .collect(),
    };

    let mut controller = Controller::new(Bmv2Connector::default(), pipeconf);
    controller
        .run_until(&rules, futures::future::pending::<()>())
        .await
        .unwrap();
    assert!(controller.connections().is_empty());

    let seen = switch.seen.lock();
    assert_eq!(seen.arbitrations.len(), 1);
    assert_eq!(seen.pipelines.len(), 1);
    assert_eq!(seen.installed, expected);
    assert_eq!(seen.reads.len(), 1);
}
