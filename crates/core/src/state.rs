//! State Mapper (spec §4.7) — pure mapping from broker-native leaf states
//! into `GatewayTaskState`, plus the aggregate-state rule retrieval applies
//! across a DAG's leaves (spec §4.6 step 5).

use crate::dag::GatewayTaskState;

/// Map a broker-reported state string onto `GatewayTaskState`.
///
/// Unknown strings map to `Pending` rather than erroring — a broker state
/// the gateway doesn't recognize is treated the same as "not ready yet"
/// (spec §4.2: `probe_ready` never raises on unknown ids, and state
/// vocabulary is closed over the set in spec §3).
pub fn map_broker_state(raw: &str) -> GatewayTaskState {
    match raw {
        "PENDING" => GatewayTaskState::Pending,
        "RECEIVED" => GatewayTaskState::Received,
        "STARTED" => GatewayTaskState::Started,
        "SUCCESS" => GatewayTaskState::Success,
        "FAILURE" => GatewayTaskState::Failure,
        "REVOKED" => GatewayTaskState::Revoked,
        "REJECTED" => GatewayTaskState::Rejected,
        "RETRY" => GatewayTaskState::Retry,
        "IGNORED" => GatewayTaskState::Ignored,
        _ => GatewayTaskState::Pending,
    }
}

/// One leaf's observed readiness, as returned by `probe_ready` (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct LeafObservation {
    pub ready: bool,
    pub state: GatewayTaskState,
    pub success: Option<bool>,
}

/// Aggregate a DAG's per-leaf observations into one gateway task state
/// (spec §4.6 step 5).
///
/// Rules, in priority order:
/// 1. any leaf not ready → `Pending` (caller should poll again).
/// 2. a broker-reported `Revoked`/`Rejected`/`Retry`/`Ignored` on any leaf
///    propagates verbatim.
/// 3. all ready and all `success == true` → `Success`.
/// 4. all ready and at least one `success == false` → `Failure`.
pub fn aggregate_state(observations: &[LeafObservation]) -> GatewayTaskState {
    if observations.iter().any(|o| !o.ready) {
        return GatewayTaskState::Pending;
    }

    for o in observations {
        if matches!(
            o.state,
            GatewayTaskState::Revoked
                | GatewayTaskState::Rejected
                | GatewayTaskState::Retry
                | GatewayTaskState::Ignored
        ) {
            return o.state;
        }
    }

    if observations.iter().all(|o| o.success == Some(true)) {
        GatewayTaskState::Success
    } else {
        GatewayTaskState::Failure
    }
}
