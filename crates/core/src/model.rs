//! Compute Input/Output and submission option types (spec §3).
//!
//! The chemistry document itself is treated as opaque: the core only ever
//! inspects a handful of named fields (`calctype`, `subprogram`,
//! `subprogram_args`, `molecule.atoms`, `success`). Everything else rides
//! through as an untyped JSON value so the gateway never needs to track the
//! chemistry schema's evolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three input shapes a caller may submit (spec §3).
///
/// Kept as a single struct with an `extra` bag rather than three distinct
/// Rust types: the gateway only ever reads `calctype`, `subprogram`, and
/// `subprogram_args`/`molecule.atoms` off it, and the remaining fields
/// (molecule, model, keywords, files) are opaque to this core, exactly as
/// spec §3 describes. `kind` records which of ProgramInput / FileInput /
/// DualProgramInput the caller sent, for diagnostics only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeInput {
    /// Discriminates ProgramInput / FileInput / DualProgramInput. Not
    /// consumed by planning logic beyond the `DualProgramInput` check for
    /// bigchem submissions.
    #[serde(default)]
    pub kind: InputKind,

    #[serde(default)]
    pub calctype: Option<CalcType>,

    /// Present only on DualProgramInput; names the program bigchem should
    /// fan gradient leaves out to.
    #[serde(default)]
    pub subprogram: Option<String>,

    /// Present only on DualProgramInput; merged into the ProgramInput built
    /// for each gradient leaf.
    #[serde(default)]
    pub subprogram_args: Option<serde_json::Value>,

    /// Molecular structure. Only `atoms` is read (to size a bigchem chord);
    /// everything else is opaque.
    #[serde(default)]
    pub molecule: Option<serde_json::Value>,

    /// Every remaining field the caller sent (model, keywords, files,
    /// extras, ...), preserved verbatim for the worker.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ComputeInput {
    /// Number of atoms in `molecule.atoms`/`molecule.symbols`, used to size
    /// a bigchem finite-difference chord (spec §4.4 rule 2: `M = 6·|atoms|`).
    pub fn atom_count(&self) -> Option<usize> {
        let molecule = self.molecule.as_ref()?;
        molecule
            .get("atoms")
            .or_else(|| molecule.get("symbols"))
            .and_then(|v| v.as_array())
            .map(|a| a.len())
    }

    /// `subprogram_args` as an owned JSON object, defaulting to empty when
    /// absent or not an object (used to seed the extra fields of a bigchem
    /// fan-out leaf's ProgramInput).
    pub fn subprogram_args_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.subprogram_args
            .as_ref()
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default()
    }

    /// `molecule.geometry` as rows of Cartesian coordinates, one row per
    /// atom, for perturbing a finite-difference displacement in place.
    pub fn geometry_rows(&self) -> Option<Vec<Vec<f64>>> {
        let geometry = self.molecule.as_ref()?.get("geometry")?.as_array()?;
        geometry
            .iter()
            .map(|row| {
                row.as_array().map(|r| {
                    r.iter().filter_map(serde_json::Value::as_f64).collect::<Vec<_>>()
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    ProgramInput,
    FileInput,
    DualProgramInput,
}

/// Calculation type requested of a ProgramInput/DualProgramInput (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcType {
    Energy,
    Gradient,
    Hessian,
    Optimization,
    Properties,
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalcType::Energy => "energy",
            CalcType::Gradient => "gradient",
            CalcType::Hessian => "hessian",
            CalcType::Optimization => "optimization",
            CalcType::Properties => "properties",
        };
        write!(f, "{s}")
    }
}

/// A single input or a batch, as accepted by the submission body (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComputeInputOrList {
    Single(Box<ComputeInput>),
    Batch(Vec<ComputeInput>),
}

/// Program selector (spec §3). Carried as its string form onto the wire so
/// worker deserializers need no shared code with the gateway (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramSelector {
    Psi4,
    Terachem,
    Rdkit,
    Xtb,
    Geometric,
    Crest,
    /// Pseudo-program selecting a parallel distributed algorithm instead of
    /// a single backend (spec §3).
    Bigchem,
}

impl ProgramSelector {
    /// The wire form passed to workers (spec §4.1: "string form, never a
    /// native enum").
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ProgramSelector::Psi4 => "psi4",
            ProgramSelector::Terachem => "terachem",
            ProgramSelector::Rdkit => "rdkit",
            ProgramSelector::Xtb => "xtb",
            ProgramSelector::Geometric => "geometric",
            ProgramSelector::Crest => "crest",
            ProgramSelector::Bigchem => "bigchem",
        }
    }

    pub fn is_bigchem(&self) -> bool {
        matches!(self, ProgramSelector::Bigchem)
    }
}

impl fmt::Display for ProgramSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

/// Recognized per-submission flags (spec §3). `queue` has no default
/// (absence means "use the default queue").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeOptions {
    #[serde(default = "default_true")]
    pub collect_stdout: bool,
    #[serde(default)]
    pub collect_files: bool,
    #[serde(default)]
    pub collect_wfn: bool,
    #[serde(default = "default_true")]
    pub rm_scratch_dir: bool,
    #[serde(default)]
    pub propagate_wfn: bool,
    #[serde(default)]
    pub queue: Option<String>,
}

fn default_true() -> bool {
    true
}

const KNOWN_OPTION_KEYS: &[&str] = &[
    "collect_stdout",
    "collect_files",
    "collect_wfn",
    "rm_scratch_dir",
    "propagate_wfn",
    "queue",
];

impl ComputeOptions {
    /// Parse options out of the raw query-string map the submission
    /// endpoint receives (spec §4.5: options ride as query params
    /// alongside `program`). Rejects any key this gateway doesn't
    /// recognize with `UnknownOption` (spec §4.4 edge case) instead of
    /// silently ignoring it.
    pub fn parse(
        raw: &std::collections::HashMap<String, String>,
    ) -> crate::error::GatewayResult<Self> {
        for key in raw.keys() {
            if key == "program" || key == "queue" {
                continue;
            }
            if !KNOWN_OPTION_KEYS.contains(&key.as_str()) {
                return Err(crate::error::GatewayError::UnknownOption(key.clone()));
            }
        }

        let parse_bool = |key: &str, default: bool| -> crate::error::GatewayResult<bool> {
            match raw.get(key) {
                None => Ok(default),
                Some(v) => v
                    .parse::<bool>()
                    .map_err(|_| crate::error::GatewayError::SchemaViolation(
                        format!("option '{key}' must be a boolean"),
                    )),
            }
        };

        Ok(Self {
            collect_stdout: parse_bool("collect_stdout", true)?,
            collect_files: parse_bool("collect_files", false)?,
            collect_wfn: parse_bool("collect_wfn", false)?,
            rm_scratch_dir: parse_bool("rm_scratch_dir", true)?,
            propagate_wfn: parse_bool("propagate_wfn", false)?,
            queue: raw.get("queue").cloned(),
        })
    }
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            collect_stdout: true,
            collect_files: false,
            collect_wfn: false,
            rm_scratch_dir: true,
            propagate_wfn: false,
            queue: None,
        }
    }
}

/// Opaque per-leaf outcome (spec §3). Always carries `success`; the worker
/// attaches a structured body even when it raised, so this never needs to
/// represent a bare exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramOutput {
    pub success: bool,
    /// Everything else the worker returned (stdout, files, results,
    /// diagnostics), preserved verbatim.
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl ProgramOutput {
    pub fn failure(diagnostic: impl Into<String>) -> Self {
        let mut body = serde_json::Map::new();
        body.insert(
            "traceback".to_string(),
            serde_json::Value::String(diagnostic.into()),
        );
        Self {
            success: false,
            body,
        }
    }
}

/// One output, or a list of them preserving submission order (spec §4.6
/// step 4: "unwrap rule" — single Leaf unwraps, Group stays a list).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgramOutputOrList {
    Single(ProgramOutput),
    List(Vec<ProgramOutput>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_options_defaults_match_spec() {
        let opts = ComputeOptions::default();
        assert!(opts.collect_stdout);
        assert!(!opts.collect_files);
        assert!(!opts.collect_wfn);
        assert!(opts.rm_scratch_dir);
        assert!(!opts.propagate_wfn);
        assert!(opts.queue.is_none());
    }

    #[test]
    fn unknown_option_is_rejected() {
        let raw = serde_json::json!({ "not_a_real_option": true });
        let result: Result<ComputeOptions, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_unknown_query_key() {
        let mut raw = std::collections::HashMap::new();
        raw.insert("bogus_flag".to_string(), "true".to_string());
        let err = ComputeOptions::parse(&raw).unwrap_err();
        assert!(matches!(err, crate::error::GatewayError::UnknownOption(_)));
    }

    #[test]
    fn parse_applies_defaults_when_absent() {
        let raw = std::collections::HashMap::new();
        let opts = ComputeOptions::parse(&raw).unwrap();
        assert_eq!(opts.collect_stdout, true);
        assert_eq!(opts.rm_scratch_dir, true);
        assert!(opts.queue.is_none());
    }

    #[test]
    fn atom_count_reads_molecule_atoms() {
        let input = ComputeInput {
            kind: InputKind::DualProgramInput,
            calctype: Some(CalcType::Hessian),
            subprogram: Some("rdkit".into()),
            subprogram_args: None,
            molecule: Some(serde_json::json!({"atoms": ["O", "H", "H"]})),
            extra: Default::default(),
        };
        assert_eq!(input.atom_count(), Some(3));
    }

    #[test]
    fn geometry_rows_reads_molecule_geometry() {
        let input = ComputeInput {
            kind: InputKind::DualProgramInput,
            calctype: Some(CalcType::Hessian),
            subprogram: Some("rdkit".into()),
            subprogram_args: None,
            molecule: Some(serde_json::json!({
                "atoms": ["O", "H", "H"],
                "geometry": [[0.0, 0.0, 0.0], [0.0, 0.0, 1.8], [1.7, 0.0, -0.5]],
            })),
            extra: Default::default(),
        };
        let rows = input.geometry_rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec![0.0, 0.0, 1.8]);
    }
}
