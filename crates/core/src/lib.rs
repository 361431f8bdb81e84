//! Job-submission and result-lifecycle core for the ChemCloud compute
//! gateway.
//!
//! This crate owns everything that can be expressed without touching
//! HTTP: the task DAG model, the dispatch planner, the broker-state
//! mapper, and the two outbound client traits (`BrokerClient`,
//! `ResultBackendClient`) plus their in-memory fakes. The web crate
//! wires these into axum handlers.

pub mod backend;
pub mod broker;
pub mod config;
pub mod dag;
pub mod error;
pub mod model;
pub mod planner;
pub mod state;

pub use backend::{BackendConfig, InMemoryResultBackend, LeafRecord, ResultBackendClient, SurrealResultBackend};
pub use broker::{AsyncHandle, BrokerClient, ChordHandle, GroupHandle, InMemoryBrokerClient, ReqwestBrokerClient};
pub use config::Settings;
pub use dag::{GatewayTaskState, Leaf, TaskDag};
pub use error::{GatewayError, GatewayResult};
pub use model::{
    CalcType, ComputeInput, ComputeInputOrList, ComputeOptions, InputKind, ProgramOutput,
    ProgramOutputOrList, ProgramSelector,
};
pub use planner::{plan, GradientLeafPlan, Plan, ReducerAlgorithm, ReducerPlan};
pub use state::{aggregate_state, map_broker_state, LeafObservation};
