//! Submission API (spec §4.5) and Retrieval API (spec §4.6).
//!
//! Handler shape — extractors in, `Result<Json<_>, AppError>` out,
//! railway-style `?` chaining. The wire contract itself (query-param
//! options, bare-string submission response, `{state, result}` retrieval
//! envelope) matches `original_source/chemcloud_server/routes/compute.py`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chemgate_core::{
    aggregate_state, plan, BrokerClient, ComputeInputOrList, ComputeOptions, GatewayError,
    GatewayTaskState, Leaf, LeafObservation, Plan, ProgramSelector, ReducerAlgorithm, ReducerPlan,
    TaskDag,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::cleanup::schedule_delete;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub state: GatewayTaskState,
    pub result: Option<Value>,
}

fn uuid_v4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
        )
        .expect("static uuid v4 pattern is valid")
    })
}

/// Validate the path parameter *before any backend I/O* (spec §4.6,
/// §8 scenario 6: "malformed id → 422; no backend call recorded").
fn parse_task_id(raw: &str) -> Result<Uuid> {
    if !uuid_v4_regex().is_match(raw) {
        return Err(AppError::Gateway(GatewayError::InvalidTaskId(raw.to_string())));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::Gateway(GatewayError::InvalidTaskId(raw.to_string())))
}

fn parse_program(raw: &HashMap<String, String>) -> Result<ProgramSelector> {
    let name = raw
        .get("program")
        .ok_or_else(|| AppError::Gateway(GatewayError::SchemaViolation("missing 'program' query parameter".into())))?;
    match name.as_str() {
        "psi4" => Ok(ProgramSelector::Psi4),
        "terachem" => Ok(ProgramSelector::Terachem),
        "rdkit" => Ok(ProgramSelector::Rdkit),
        "xtb" => Ok(ProgramSelector::Xtb),
        "geometric" => Ok(ProgramSelector::Geometric),
        "crest" => Ok(ProgramSelector::Crest),
        "bigchem" => Ok(ProgramSelector::Bigchem),
        other => Err(AppError::Gateway(GatewayError::SchemaViolation(format!(
            "unsupported program '{other}'"
        )))),
    }
}

/// POST `/compute` (spec §4.5).
pub async fn submit_compute(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(raw_params): Query<HashMap<String, String>>,
    Json(body): Json<ComputeInputOrList>,
) -> Result<Json<String>> {
    let program = parse_program(&raw_params)?;
    let options = ComputeOptions::parse(&raw_params)?;

    let the_plan = plan(program, body, options, state.settings.max_batch_inputs)?;
    let dag = materialize(&state.broker, the_plan).await?;
    let root_id = dag.root_id();

    let blob = dag.serialize()?;
    if let Err(e) = state.backend.put_dag(root_id, blob).await {
        // Best-effort revocation — the broker already accepted these
        // tasks, so limit wasted worker time rather than leaving them to
        // run with no DAG ever persisted (spec §4.5 ordering guarantee).
        for leaf in dag.leaves() {
            state.broker.revoke(leaf.task_id).await;
        }
        return Err(AppError::Gateway(e));
    }

    Ok(Json(root_id.to_string()))
}

fn leaf_wire_value(input: &chemgate_core::ComputeInput, options: &ComputeOptions) -> Value {
    json!({ "input": input, "options": options })
}

fn reducer_wire_value(reducer: &ReducerPlan, options: &ComputeOptions) -> Value {
    let algorithm = match reducer.algorithm {
        ReducerAlgorithm::HessianAssembly => "hessian_assembly",
        ReducerAlgorithm::FrequencyAnalysis => "frequency_analysis",
    };
    json!({
        "calctype": reducer.calctype,
        "algorithm": algorithm,
        "finite_difference_step": chemgate_core::planner::BIGCHEM_FINITE_DIFFERENCE_STEP,
        "options": options,
    })
}

/// Walk a `Plan` and submit it through the broker, producing the
/// `TaskDag` that gets persisted (spec §4.5 step 4). A batch whose
/// elements are themselves compound shapes (nested Group/Chord) has no
/// representation in the DAG model — spec §3 defines Group as
/// `(group_id, [Leaf…])`, a flat list of leaves, not of sub-trees — so
/// that combination is rejected rather than silently flattened.
async fn materialize(broker: &Arc<dyn BrokerClient>, the_plan: Plan) -> Result<TaskDag> {
    match the_plan {
        Plan::Leaf { program, input, options } => {
            let value = leaf_wire_value(&input, &options);
            let handle = broker
                .submit_leaf(program, value.clone(), options.queue.as_deref())
                .await?;
            Ok(TaskDag::Leaf(handle.into_leaf(program, value)))
        }
        Plan::Group { elements } => {
            let mut programs_and_inputs = Vec::with_capacity(elements.len());
            let mut queue = None;
            for element in elements {
                match element {
                    Plan::Leaf { program, input, options } => {
                        queue = options.queue.clone();
                        programs_and_inputs.push((program, leaf_wire_value(&input, &options)));
                    }
                    _ => {
                        return Err(AppError::Gateway(GatewayError::SchemaViolation(
                            "batched bigchem submissions are not supported".to_string(),
                        )))
                    }
                }
            }
            let program = programs_and_inputs
                .first()
                .map(|(p, _)| *p)
                .ok_or_else(|| AppError::Gateway(GatewayError::SchemaViolation("empty batch".to_string())))?;
            let inputs: Vec<Value> = programs_and_inputs.iter().map(|(_, v)| v.clone()).collect();
            let handle = broker.submit_group(program, inputs, queue.as_deref()).await?;

            let leaves = handle
                .children
                .into_iter()
                .zip(programs_and_inputs)
                .map(|(async_handle, (program, value))| async_handle.into_leaf(program, value))
                .collect();

            Ok(TaskDag::Group {
                group_id: handle.group_id,
                leaves,
            })
        }
        Plan::Chord { fan_out, reducer, options } => {
            let program = fan_out
                .first()
                .map(|g| g.program)
                .ok_or_else(|| AppError::Gateway(GatewayError::SchemaViolation("chord with no fan-out leaves".to_string())))?;

            let fan_out_inputs: Vec<Value> = fan_out.iter().map(|g| leaf_wire_value(&g.input, &options)).collect();
            let reducer_value = reducer_wire_value(&reducer, &options);

            let handle = broker
                .submit_chord(program, fan_out_inputs.clone(), reducer_value.clone(), options.queue.as_deref())
                .await?;

            let leaves: Vec<Leaf> = handle
                .fan_out
                .into_iter()
                .zip(fan_out.iter().zip(fan_out_inputs))
                .map(|(async_handle, (gradient, value))| async_handle.into_leaf(gradient.program, value))
                .collect();

            let reducer_leaf = Leaf {
                task_id: handle.reducer.task_id,
                program: ProgramSelector::Bigchem,
                input: reducer_value,
            };

            Ok(TaskDag::Chord {
                chord_id: handle.chord_id,
                leaves,
                reducer: Box::new(reducer_leaf),
            })
        }
    }
}

/// GET `/compute/output/{task_id}` (spec §4.6).
pub async fn get_output(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(task_id_raw): Path<String>,
) -> Result<Json<OutputResponse>> {
    let task_id = parse_task_id(&task_id_raw)?;

    let blob = state
        .backend
        .get_dag(task_id)
        .await?
        .ok_or(AppError::Gateway(GatewayError::ResultNotFound))?;
    let dag = TaskDag::deserialize(&blob)?;

    let leaves = dag.leaves();
    let mut records = Vec::with_capacity(leaves.len());
    let mut observations = Vec::with_capacity(leaves.len());
    for leaf in &leaves {
        let record = state.backend.probe_ready(leaf.task_id).await?;
        observations.push(LeafObservation {
            ready: record.ready,
            state: record.state,
            success: record.output.as_ref().and_then(|o| o.get("success")).and_then(Value::as_bool),
        });
        records.push(record);
    }

    let aggregate = aggregate_state(&observations);
    if aggregate == GatewayTaskState::Pending {
        return Ok(Json(OutputResponse { state: aggregate, result: None }));
    }

    // Unwrap rule (spec §4.6 step 4 / §8): Leaf unwraps, Group stays a
    // list in submission order, Chord surfaces only the reducer output.
    let result = match &dag {
        TaskDag::Leaf(_) => records.into_iter().next().and_then(|r| r.output),
        TaskDag::Group { .. } => Some(Value::Array(
            records.into_iter().map(|r| r.output.unwrap_or(Value::Null)).collect(),
        )),
        TaskDag::Chord { .. } => records.into_iter().next_back().and_then(|r| r.output),
    };

    schedule_delete(state.backend.clone(), task_id);

    Ok(Json(OutputResponse { state: aggregate, result }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_uuid() {
        assert!(parse_task_id("not-a-uuid").is_err());
    }

    #[test]
    fn rejects_uuid_v1() {
        assert!(parse_task_id("6ba7b810-9dad-11d1-80b4-00c04fd430c8").is_err());
    }

    #[test]
    fn accepts_canonical_uuid_v4() {
        assert!(parse_task_id("00000000-0000-4000-8000-000000000000").is_ok());
    }

    #[test]
    fn parse_program_rejects_unknown() {
        let mut raw = HashMap::new();
        raw.insert("program".to_string(), "fortran77".to_string());
        assert!(parse_program(&raw).is_err());
    }

    #[test]
    fn parse_program_accepts_bigchem() {
        let mut raw = HashMap::new();
        raw.insert("program".to_string(), "bigchem".to_string());
        assert_eq!(parse_program(&raw).unwrap(), ProgramSelector::Bigchem);
    }
}
