//! Task DAG model (spec §3, §4.3).
//!
//! Re-expressed as a single tagged variant rather than the two parallel
//! class hierarchies (task-definition vs. result) the original source uses
//! for this (spec §9 design note) — every consumer matches exhaustively on
//! `TaskDag` instead of doing runtime type dispatch.

use crate::error::{GatewayError, GatewayResult};
use crate::model::ProgramSelector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One worker invocation: an id, the program it runs on, and the opaque
/// input document (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Leaf {
    pub task_id: Uuid,
    pub program: ProgramSelector,
    pub input: serde_json::Value,
}

/// The serializable task tree rooted at one id (spec §3).
///
/// Invariants upheld by construction (never by post-hoc validation):
/// every id is a UUID v4 (generated with `Uuid::new_v4`); every leaf
/// belongs to at most one parent (leaves are owned, never shared, by
/// `Vec<Leaf>`); a Chord's reducer is a distinct `Leaf` that never appears
/// in `Group`/`Chord` fan-out lists; the tree has no cycles by
/// construction (it is a plain algebraic data type, not a graph with
/// back-edges).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskDag {
    Leaf(Leaf),
    /// Independent fan-out, no reducer.
    Group { group_id: Uuid, leaves: Vec<Leaf> },
    /// Fan-out of gradient computations whose outputs feed a reducer leaf
    /// (hessian assembly or frequency analysis).
    Chord {
        chord_id: Uuid,
        leaves: Vec<Leaf>,
        reducer: Box<Leaf>,
    },
}

impl TaskDag {
    /// The id a caller polls retrieval with — the root of this DAG.
    pub fn root_id(&self) -> Uuid {
        match self {
            TaskDag::Leaf(leaf) => leaf.task_id,
            TaskDag::Group { group_id, .. } => *group_id,
            TaskDag::Chord { chord_id, .. } => *chord_id,
        }
    }

    /// Every leaf a retrieval must probe for readiness, in submission
    /// order. For a Chord this is the fan-out leaves followed by the
    /// reducer (the reducer only becomes ready once the broker has run it,
    /// which itself depends on the fan-out, but the gateway treats
    /// readiness as a flat probe over every leaf it knows about).
    pub fn leaves(&self) -> Vec<&Leaf> {
        match self {
            TaskDag::Leaf(leaf) => vec![leaf],
            TaskDag::Group { leaves, .. } => leaves.iter().collect(),
            TaskDag::Chord { leaves, reducer, .. } => {
                let mut all: Vec<&Leaf> = leaves.iter().collect();
                all.push(reducer);
                all
            }
        }
    }

    /// Serialize to a stable, self-describing JSON byte blob (spec §4.3).
    pub fn serialize(&self) -> GatewayResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| GatewayError::BackendUnavailable(format!("dag serialize: {e}")))
    }

    /// Deserialize a DAG blob written by (possibly) a different gateway
    /// process (spec §4.3).
    pub fn deserialize(bytes: &[u8]) -> GatewayResult<TaskDag> {
        serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::BackendUnavailable(format!("dag deserialize: {e}")))
    }
}

/// Gateway-facing task state (spec §3). Collapsed from broker-native states
/// by the state mapper (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayTaskState {
    Pending,
    Received,
    Started,
    Success,
    Failure,
    Revoked,
    Rejected,
    Retry,
    Ignored,
}

impl GatewayTaskState {
    /// Terminal states (spec §3): no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GatewayTaskState::Success
                | GatewayTaskState::Failure
                | GatewayTaskState::Revoked
                | GatewayTaskState::Rejected
                | GatewayTaskState::Ignored
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> Leaf {
        Leaf {
            task_id: Uuid::new_v4(),
            program: ProgramSelector::Psi4,
            input: serde_json::json!({"calctype": "energy"}),
        }
    }

    #[test]
    fn round_trip_leaf() {
        let dag = TaskDag::Leaf(leaf());
        let bytes = dag.serialize().unwrap();
        let restored = TaskDag::deserialize(&bytes).unwrap();
        assert_eq!(dag, restored);
    }

    #[test]
    fn round_trip_group() {
        let dag = TaskDag::Group {
            group_id: Uuid::new_v4(),
            leaves: vec![leaf(), leaf()],
        };
        let bytes = dag.serialize().unwrap();
        let restored = TaskDag::deserialize(&bytes).unwrap();
        assert_eq!(dag, restored);
    }

    #[test]
    fn round_trip_chord() {
        let dag = TaskDag::Chord {
            chord_id: Uuid::new_v4(),
            leaves: vec![leaf(), leaf(), leaf()],
            reducer: Box::new(leaf()),
        };
        let bytes = dag.serialize().unwrap();
        let restored = TaskDag::deserialize(&bytes).unwrap();
        assert_eq!(dag, restored);
    }

    #[test]
    fn chord_leaves_includes_reducer_last() {
        let fan_out = vec![leaf(), leaf()];
        let reducer = leaf();
        let dag = TaskDag::Chord {
            chord_id: Uuid::new_v4(),
            leaves: fan_out.clone(),
            reducer: Box::new(reducer.clone()),
        };
        let all = dag.leaves();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().task_id, reducer.task_id);
    }

    #[test]
    fn terminal_states() {
        assert!(GatewayTaskState::Success.is_terminal());
        assert!(GatewayTaskState::Failure.is_terminal());
        assert!(GatewayTaskState::Revoked.is_terminal());
        assert!(GatewayTaskState::Rejected.is_terminal());
        assert!(GatewayTaskState::Ignored.is_terminal());
        assert!(!GatewayTaskState::Pending.is_terminal());
        assert!(!GatewayTaskState::Started.is_terminal());
        assert!(!GatewayTaskState::Retry.is_terminal());
    }
}
