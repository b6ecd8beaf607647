use log::debug;

use crate::error::{PipeconfError, UpdateError};
use crate::p4rt::bmv2::Bmv2MasterUpdateOption;
use crate::proto::p4config::{match_field, Action, P4Info, Table};
use crate::proto::p4runtime::{
    entity, field_match, set_forwarding_pipeline_config_request, stream_message_request,
    table_action, update, Entity, FieldMatch, ForwardingPipelineConfig, MasterArbitrationUpdate,
    ReadRequest, SetForwardingPipelineConfigRequest, StreamMessageRequest, TableAction,
    TableEntry, Uint128, Update, WriteRequest,
};
use crate::proto::rpc;
use crate::util::flow::{FlowActionParam, FlowMatch};
use crate::util::value::{InnerValue, Value};
use bytes::{Bytes, BytesMut};
use prost::Message;
use std::path::Path;

pub fn new_write_table_entry(
    device_id: u64,
    election_id: Uint128,
    table_entry: TableEntry,
) -> WriteRequest {
    let update_type = if table_entry.is_default_action {
        update::Type::Modify
    } else {
        update::Type::Insert
    };
    WriteRequest {
        device_id,
        role_id: 0,
        election_id: Some(election_id),
        updates: vec![Update {
            r#type: update_type as i32,
            entity: Some(table_entry_to_entity(table_entry)),
        }],
        atomicity: 0,
    }
}

/// Sizes a big-endian value to exactly `(bitwidth + 7) / 8` bytes.
///
/// Shorter values are zero-padded on the left. Values with significant bits
/// beyond `bitwidth` are rejected.
pub fn adjust_value(value: Bytes, bitwidth: i32) -> Result<Bytes, String> {
    if bitwidth <= 0 {
        return Err(format!("invalid bitwidth {}", bitwidth));
    }
    let bytes_len = ((bitwidth + 7) / 8) as usize;
    let first = value
        .iter()
        .position(|b| *b != 0)
        .unwrap_or_else(|| value.len());
    let significant = &value[first..];
    let too_wide = significant.len() > bytes_len
        || (significant.len() == bytes_len
            && bitwidth % 8 != 0
            && significant[0] >> (bitwidth % 8) != 0);
    if too_wide {
        return Err(format!(
            "0x{} does not fit in {} bits",
            hex::encode(significant),
            bitwidth
        ));
    }
    if value.len() == bytes_len {
        return Ok(value);
    }
    let mut adjusted = BytesMut::with_capacity(bytes_len);
    adjusted.extend_from_slice(&vec![0u8; bytes_len - significant.len()]);
    adjusted.extend_from_slice(significant);
    Ok(adjusted.freeze())
}

fn full_mask(bitwidth: i32) -> Bytes {
    let bytes_len = ((bitwidth + 7) / 8) as usize;
    let mut mask = vec![0xffu8; bytes_len];
    if bitwidth % 8 != 0 {
        mask[0] = 0xff >> (8 - bitwidth % 8);
    }
    Bytes::from(mask)
}

pub fn build_table_entry(
    p4info: &P4Info,
    table_name: &str,
    match_fields: &[FlowMatch],
    default_action: bool,
    action_name: &str,
    action_params: &[FlowActionParam],
    priority: i32,
) -> Result<TableEntry, PipeconfError> {
    let table = get_table(p4info, table_name)
        .ok_or_else(|| PipeconfError::TableNotFound(table_name.to_owned()))?;
    let action = get_action(p4info, action_name)
        .ok_or_else(|| PipeconfError::ActionNotFound(action_name.to_owned()))?;

    let mut r#match = Vec::with_capacity(match_fields.len());
    for m in match_fields {
        r#match.push(get_match_field_pb(table, &m.name, &m.value)?);
    }

    let mut params = Vec::with_capacity(action_params.len());
    for p in action_params {
        params.push(get_action_param_pb(action, &p.name, &p.value)?);
    }

    Ok(TableEntry {
        table_id: preamble_id(table.preamble.as_ref()),
        r#match,
        action: Some(TableAction {
            r#type: Some(table_action::Type::Action(
                crate::proto::p4runtime::Action {
                    action_id: preamble_id(action.preamble.as_ref()),
                    params,
                },
            )),
        }),
        priority,
        is_default_action: default_action,
        ..Default::default()
    })
}

fn preamble_id(preamble: Option<&crate::proto::p4config::Preamble>) -> u32 {
    preamble.map(|p| p.id).unwrap_or(0)
}

pub fn table_entry_to_entity(table_entry: TableEntry) -> Entity {
    Entity {
        entity: Some(entity::Entity::TableEntry(table_entry)),
    }
}

fn preamble_matches(preamble: Option<&crate::proto::p4config::Preamble>, name: &str) -> bool {
    preamble.map_or(false, |pre| pre.name == name || pre.alias == name)
}

pub fn get_table<'a>(p4info: &'a P4Info, name: &str) -> Option<&'a Table> {
    p4info
        .tables
        .iter()
        .find(|t| preamble_matches(t.preamble.as_ref(), name))
}

pub fn get_table_name(p4info: &P4Info, id: u32) -> Option<&str> {
    p4info
        .tables
        .iter()
        .filter_map(|t| t.preamble.as_ref())
        .find(|pre| pre.id == id)
        .map(|pre| pre.name.as_str())
}

pub fn get_action<'a>(p4info: &'a P4Info, name: &str) -> Option<&'a Action> {
    p4info
        .actions
        .iter()
        .find(|a| preamble_matches(a.preamble.as_ref(), name))
}

pub fn get_action_name(p4info: &P4Info, id: u32) -> Option<&str> {
    p4info
        .actions
        .iter()
        .filter_map(|a| a.preamble.as_ref())
        .find(|pre| pre.id == id)
        .map(|pre| pre.name.as_str())
}

fn encode(name: &str, value: &Value, bitwidth: i32) -> Result<Bytes, PipeconfError> {
    value.encode(bitwidth).map_err(|reason| PipeconfError::Encode {
        name: name.to_owned(),
        reason,
    })
}

fn get_match_field_pb(
    table: &Table,
    match_field_name: &str,
    value: &InnerValue,
) -> Result<FieldMatch, PipeconfError> {
    let table_name = table
        .preamble
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or_default();
    let p4info_match = table
        .match_fields
        .iter()
        .find(|mf| mf.name == match_field_name)
        .ok_or_else(|| PipeconfError::MatchFieldNotFound {
            table: table_name.to_owned(),
            field: match_field_name.to_owned(),
        })?;
    let bitwidth = p4info_match.bitwidth;
    let name = match_field_name;

    let match_type = match &p4info_match.r#match {
        Some(match_field::Match::MatchType(t)) => match_field::MatchType::from_i32(*t),
        _ => None,
    };
    let mismatch = || PipeconfError::MatchKindMismatch {
        field: name.to_owned(),
        expected: match &p4info_match.r#match {
            Some(match_field::Match::MatchType(t)) => match match_field::MatchType::from_i32(*t) {
                Some(t) => format!("{:?}", t),
                None => format!("match type {}", t),
            },
            Some(match_field::Match::OtherMatchType(other)) => other.clone(),
            None => "unspecified".to_owned(),
        },
        got: value.kind(),
    };

    let field_match_type = match (match_type, value) {
        (Some(match_field::MatchType::Exact), InnerValue::Exact(v)) => {
            field_match::FieldMatchType::Exact(field_match::Exact {
                value: encode(name, v, bitwidth)?,
            })
        }
        (Some(match_field::MatchType::Lpm), InnerValue::Lpm(v, prefix_len)) => {
            if *prefix_len < 0 || *prefix_len > bitwidth {
                return Err(PipeconfError::Encode {
                    name: name.to_owned(),
                    reason: format!("prefix length {} out of 0..={}", prefix_len, bitwidth),
                });
            }
            field_match::FieldMatchType::Lpm(field_match::Lpm {
                value: encode(name, v, bitwidth)?,
                prefix_len: *prefix_len,
            })
        }
        (Some(match_field::MatchType::Ternary), InnerValue::Ternary(v, mask)) => {
            field_match::FieldMatchType::Ternary(field_match::Ternary {
                value: encode(name, v, bitwidth)?,
                mask: encode(name, mask, bitwidth)?,
            })
        }
        (Some(match_field::MatchType::Ternary), InnerValue::Exact(v)) => {
            debug!(target: "pipeconf", "exact value for ternary field {}, using a full mask", name);
            field_match::FieldMatchType::Ternary(field_match::Ternary {
                value: encode(name, v, bitwidth)?,
                mask: full_mask(bitwidth),
            })
        }
        (Some(match_field::MatchType::Range), InnerValue::Range(low, high)) => {
            field_match::FieldMatchType::Range(field_match::Range {
                low: encode(name, low, bitwidth)?,
                high: encode(name, high, bitwidth)?,
            })
        }
        (Some(match_field::MatchType::Optional), InnerValue::Optional(v))
        | (Some(match_field::MatchType::Optional), InnerValue::Exact(v)) => {
            field_match::FieldMatchType::Optional(field_match::Optional {
                value: encode(name, v, bitwidth)?,
            })
        }
        _ => return Err(mismatch()),
    };

    Ok(FieldMatch {
        field_id: p4info_match.id,
        field_match_type: Some(field_match_type),
    })
}

fn get_action_param_pb(
    action: &Action,
    param_name: &str,
    value: &Value,
) -> Result<crate::proto::p4runtime::action::Param, PipeconfError> {
    let p4info_param = action
        .params
        .iter()
        .find(|p| p.name == param_name)
        .ok_or_else(|| PipeconfError::ActionParamNotFound {
            action: action
                .preamble
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            param: param_name.to_owned(),
        })?;
    Ok(crate::proto::p4runtime::action::Param {
        param_id: p4info_param.id,
        value: encode(param_name, value, p4info_param.bitwidth)?,
    })
}

/// Reads the BMv2 JSON and wraps it, unmodified, as the device config.
pub async fn new_set_forwarding_pipeline_config_request(
    p4info: &P4Info,
    bmv2_json_file_path: &Path,
    device_id: u64,
    election_id: Uint128,
) -> Result<SetForwardingPipelineConfigRequest, PipeconfError> {
    let device_config = tokio::fs::read(bmv2_json_file_path)
        .await
        .map_err(|error| PipeconfError::DeviceConfigFile {
            path: bmv2_json_file_path.to_owned(),
            error,
        })?;
    Ok(SetForwardingPipelineConfigRequest {
        device_id,
        role_id: 0,
        election_id: Some(election_id),
        action: set_forwarding_pipeline_config_request::Action::VerifyAndCommit as i32,
        config: Some(ForwardingPipelineConfig {
            p4info: Some(p4info.clone()),
            p4_device_config: Bytes::from(device_config),
            cookie: None,
        }),
    })
}

pub fn new_master_update_request(
    device_id: u64,
    option: Bmv2MasterUpdateOption,
) -> StreamMessageRequest {
    StreamMessageRequest {
        update: Some(stream_message_request::Update::Arbitration(
            MasterArbitrationUpdate {
                device_id,
                role: None,
                election_id: Some(option.election_id()),
                status: None,
            },
        )),
    }
}

/// A wildcard read: table id 0 selects every table.
pub fn new_read_table_entries_request(device_id: u64) -> ReadRequest {
    ReadRequest {
        device_id,
        entities: vec![table_entry_to_entity(TableEntry::default())],
    }
}

/// Extracts the per-update `p4.v1.Error` list a P4Runtime server packs into
/// the `google.rpc.Status` details of a failed `Write`. Updates that
/// succeeded (canonical code 0) are left out.
pub fn decode_update_errors(status: &tonic::Status) -> Vec<UpdateError> {
    let details = status.details();
    if details.is_empty() {
        return vec![];
    }
    let rpc_status = match rpc::Status::decode(details) {
        Ok(s) => s,
        Err(e) => {
            debug!(target: "core", "undecodable gRPC status details: {}", e);
            return vec![];
        }
    };
    rpc_status
        .details
        .iter()
        .enumerate()
        .filter(|(_, any)| any.type_url.ends_with("p4.v1.Error"))
        .filter_map(|(index, any)| {
            crate::proto::p4runtime::Error::decode(any.value.as_slice())
                .ok()
                .map(|e| (index, e))
        })
        .filter(|(_, e)| e.canonical_code != 0)
        .map(|(index, e)| UpdateError {
            index,
            canonical_code: e.canonical_code,
            message: e.message,
        })
        .collect()
}
