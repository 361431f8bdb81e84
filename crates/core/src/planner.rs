//! Dispatch Planner (spec §4.4) — pure function choosing a task shape from
//! a submission request.

use crate::error::{GatewayError, GatewayResult};
use crate::model::{CalcType, ComputeInput, ComputeInputOrList, ComputeOptions, InputKind, ProgramSelector};

/// Finite-difference step used for bigchem's parallel-gradient displacements
/// (unnamed as a constant in spec.md, carried over from
/// `original_source`'s `bigchem.algos.parallel_frequency_analysis` default).
pub const BIGCHEM_FINITE_DIFFERENCE_STEP: f64 = 0.005;

/// A plan: the task shape the dispatcher will materialize through the
/// broker client. Ids are not assigned here — the broker client mints them
/// on submission (spec §4.1).
#[derive(Debug, Clone)]
pub enum Plan {
    Leaf {
        program: ProgramSelector,
        input: ComputeInput,
        options: ComputeOptions,
    },
    /// Independent fan-out; `elements[i]` corresponds to `inputs[i]` in the
    /// original submission (spec §8: unwrap rule preserves order).
    Group { elements: Vec<Plan> },
    /// Finite-difference gradient fan-out feeding a reducer (spec §4.4
    /// rule 2).
    Chord {
        fan_out: Vec<GradientLeafPlan>,
        reducer: ReducerPlan,
        options: ComputeOptions,
    },
}

#[derive(Debug, Clone)]
pub struct GradientLeafPlan {
    pub program: ProgramSelector,
    pub input: ComputeInput,
}

#[derive(Debug, Clone)]
pub struct ReducerPlan {
    pub calctype: CalcType,
    /// Describes which reducer to run: hessian assembly or frequency
    /// analysis (spec §4.4: "picked by requested calctype").
    pub algorithm: ReducerAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerAlgorithm {
    HessianAssembly,
    FrequencyAnalysis,
}

/// Plan a submission (spec §4.4). Pure: no ids minted, no I/O performed.
pub fn plan(
    program: ProgramSelector,
    input_or_list: ComputeInputOrList,
    options: ComputeOptions,
    max_batch_inputs: usize,
) -> GatewayResult<Plan> {
    match input_or_list {
        ComputeInputOrList::Batch(inputs) => {
            if inputs.len() > max_batch_inputs {
                return Err(GatewayError::BatchTooLarge {
                    limit: max_batch_inputs,
                });
            }
            let elements = inputs
                .into_iter()
                .map(|input| {
                    plan(
                        program,
                        ComputeInputOrList::Single(Box::new(input)),
                        options.clone(),
                        max_batch_inputs,
                    )
                })
                .collect::<GatewayResult<Vec<_>>>()?;
            Ok(Plan::Group { elements })
        }
        ComputeInputOrList::Single(input) => {
            if program.is_bigchem() {
                plan_bigchem(*input, options)
            } else {
                Ok(Plan::Leaf {
                    program,
                    input: *input,
                    options,
                })
            }
        }
    }
}

fn plan_bigchem(input: ComputeInput, options: ComputeOptions) -> GatewayResult<Plan> {
    const SUPPORTED: CalcType = CalcType::Hessian;

    let calctype = input.calctype.ok_or_else(|| {
        GatewayError::SchemaViolation("bigchem input missing 'calctype'".to_string())
    })?;
    if calctype != SUPPORTED {
        return Err(GatewayError::UnsupportedCalcType {
            calctype: calctype.to_string(),
            supported: SUPPORTED.to_string(),
        });
    }

    if input.kind != InputKind::DualProgramInput {
        return Err(GatewayError::SchemaViolation(
            "bigchem requires a DualProgramInput".to_string(),
        ));
    }
    let subprogram = input.subprogram.clone().ok_or_else(|| {
        GatewayError::SchemaViolation("DualProgramInput missing 'subprogram'".to_string())
    })?;
    let subprogram_selector = parse_subprogram(&subprogram)?;

    let atoms = input.atom_count().ok_or_else(|| {
        GatewayError::SchemaViolation("bigchem input missing 'molecule.atoms'".to_string())
    })?;
    let geometry = input.geometry_rows().ok_or_else(|| {
        GatewayError::SchemaViolation("bigchem input missing 'molecule.geometry'".to_string())
    })?;
    if geometry.len() != atoms {
        return Err(GatewayError::SchemaViolation(format!(
            "molecule.geometry has {} rows, expected {atoms} to match molecule.atoms",
            geometry.len()
        )));
    }

    // M = 6 * |atoms| forward/backward displacement leaves -- one +dh and
    // one -dh leaf per Cartesian axis of every atom -- plus one
    // reference-energy leaf at the undisplaced geometry (spec §4.4 rule 2).
    let displacement_count = 6 * atoms;
    let mut fan_out = Vec::with_capacity(displacement_count + 1);
    for atom_index in 0..atoms {
        for axis in 0..3 {
            for sign in [1.0, -1.0] {
                fan_out.push(GradientLeafPlan {
                    program: subprogram_selector,
                    input: gradient_leaf_input(&input, &geometry, atom_index, axis, sign),
                });
            }
        }
    }
    fan_out.push(GradientLeafPlan {
        program: subprogram_selector,
        input: reference_energy_input(&input, &subprogram_selector),
    });

    Ok(Plan::Chord {
        fan_out,
        reducer: ReducerPlan {
            calctype,
            algorithm: ReducerAlgorithm::HessianAssembly,
        },
        options,
    })
}

fn parse_subprogram(name: &str) -> GatewayResult<ProgramSelector> {
    match name {
        "psi4" => Ok(ProgramSelector::Psi4),
        "terachem" => Ok(ProgramSelector::Terachem),
        "rdkit" => Ok(ProgramSelector::Rdkit),
        "xtb" => Ok(ProgramSelector::Xtb),
        "geometric" => Ok(ProgramSelector::Geometric),
        "crest" => Ok(ProgramSelector::Crest),
        other => Err(GatewayError::SchemaViolation(format!(
            "unsupported bigchem subprogram '{other}'"
        ))),
    }
}

/// Build the gradient ProgramInput for one finite-difference displacement:
/// one atom, one Cartesian axis, one sign, stepped by
/// `BIGCHEM_FINITE_DIFFERENCE_STEP`, merging `subprogram_args` into the
/// leaf the way `gradient_inputs` does in
/// `original_source/terachem_cloud/workers/helpers.py`.
fn gradient_leaf_input(
    dual: &ComputeInput,
    geometry: &[Vec<f64>],
    atom_index: usize,
    axis: usize,
    sign: f64,
) -> ComputeInput {
    let mut extra = dual.subprogram_args_map();
    extra.insert(
        "calctype".to_string(),
        serde_json::Value::String("gradient".to_string()),
    );
    ComputeInput {
        kind: InputKind::ProgramInput,
        calctype: Some(CalcType::Gradient),
        subprogram: None,
        subprogram_args: None,
        molecule: Some(perturbed_molecule(dual, geometry, atom_index, axis, sign)),
        extra,
    }
}

/// Displace `geometry[atom_index][axis]` by `sign * BIGCHEM_FINITE_DIFFERENCE_STEP`
/// and splice the result back into a clone of `dual.molecule`.
fn perturbed_molecule(
    dual: &ComputeInput,
    geometry: &[Vec<f64>],
    atom_index: usize,
    axis: usize,
    sign: f64,
) -> serde_json::Value {
    let mut molecule = dual.molecule.clone().unwrap_or(serde_json::Value::Null);
    let mut rows: Vec<serde_json::Value> = geometry
        .iter()
        .map(|row| serde_json::Value::from(row.clone()))
        .collect();
    let displaced = geometry[atom_index][axis] + sign * BIGCHEM_FINITE_DIFFERENCE_STEP;
    rows[atom_index][axis] = serde_json::json!(displaced);
    molecule["geometry"] = serde_json::Value::Array(rows);
    molecule
}

fn reference_energy_input(dual: &ComputeInput, _subprogram: &ProgramSelector) -> ComputeInput {
    let mut extra = dual.subprogram_args_map();
    extra.insert(
        "calctype".to_string(),
        serde_json::Value::String("energy".to_string()),
    );
    ComputeInput {
        kind: InputKind::ProgramInput,
        calctype: Some(CalcType::Energy),
        subprogram: None,
        subprogram_args: None,
        molecule: dual.molecule.clone(),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComputeInput;

    fn water_dual_input() -> ComputeInput {
        ComputeInput {
            kind: InputKind::DualProgramInput,
            calctype: Some(CalcType::Hessian),
            subprogram: Some("rdkit".to_string()),
            subprogram_args: Some(serde_json::json!({"model": {"method": "UFF"}})),
            molecule: Some(serde_json::json!({
                "atoms": ["O", "H", "H"],
                "geometry": [[0.0, 0.0, 0.0], [0.0, 0.0, 1.8], [1.7, 0.0, -0.5]],
            })),
            extra: Default::default(),
        }
    }

    fn simple_energy_input() -> ComputeInput {
        ComputeInput {
            kind: InputKind::ProgramInput,
            calctype: Some(CalcType::Energy),
            subprogram: None,
            subprogram_args: None,
            molecule: Some(serde_json::json!({"atoms": ["H", "H"]})),
            extra: Default::default(),
        }
    }

    #[test]
    fn single_non_bigchem_input_plans_a_leaf() {
        let result = plan(
            ProgramSelector::Psi4,
            ComputeInputOrList::Single(Box::new(simple_energy_input())),
            ComputeOptions::default(),
            100,
        )
        .unwrap();
        assert!(matches!(result, Plan::Leaf { .. }));
    }

    #[test]
    fn batch_plans_a_group_preserving_order_and_length() {
        let inputs = vec![simple_energy_input(), simple_energy_input(), simple_energy_input()];
        let result = plan(
            ProgramSelector::Psi4,
            ComputeInputOrList::Batch(inputs),
            ComputeOptions::default(),
            100,
        )
        .unwrap();
        match result {
            Plan::Group { elements } => assert_eq!(elements.len(), 3),
            _ => panic!("expected Group"),
        }
    }

    #[test]
    fn batch_over_limit_is_rejected() {
        let inputs = vec![simple_energy_input(); 5];
        let err = plan(
            ProgramSelector::Psi4,
            ComputeInputOrList::Batch(inputs),
            ComputeOptions::default(),
            4,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::BatchTooLarge { limit: 4 }));
    }

    #[test]
    fn batch_exactly_at_limit_is_accepted() {
        let inputs = vec![simple_energy_input(); 4];
        let result = plan(
            ProgramSelector::Psi4,
            ComputeInputOrList::Batch(inputs),
            ComputeOptions::default(),
            4,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn bigchem_water_hessian_plans_19_fanout_leaves() {
        let result = plan(
            ProgramSelector::Bigchem,
            ComputeInputOrList::Single(Box::new(water_dual_input())),
            ComputeOptions::default(),
            100,
        )
        .unwrap();
        match result {
            Plan::Chord { fan_out, reducer, .. } => {
                assert_eq!(fan_out.len(), 19); // 6*3 + 1
                assert_eq!(reducer.calctype, CalcType::Hessian);

                let molecules: Vec<String> = fan_out
                    .iter()
                    .map(|leaf| serde_json::to_string(&leaf.input.molecule).unwrap())
                    .collect();
                for i in 0..molecules.len() {
                    for j in (i + 1)..molecules.len() {
                        assert_ne!(
                            molecules[i], molecules[j],
                            "fan-out leaves {i} and {j} carry identical molecule geometries"
                        );
                    }
                }
            }
            _ => panic!("expected Chord"),
        }
    }

    #[test]
    fn bigchem_rejects_geometry_atom_count_mismatch() {
        let mut input = water_dual_input();
        input.molecule = Some(serde_json::json!({
            "atoms": ["O", "H", "H"],
            "geometry": [[0.0, 0.0, 0.0]],
        }));
        let err = plan(
            ProgramSelector::Bigchem,
            ComputeInputOrList::Single(Box::new(input)),
            ComputeOptions::default(),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::SchemaViolation(_)));
    }

    #[test]
    fn bigchem_rejects_non_hessian_calctype() {
        let mut input = water_dual_input();
        input.calctype = Some(CalcType::Energy);
        let err = plan(
            ProgramSelector::Bigchem,
            ComputeInputOrList::Single(Box::new(input)),
            ComputeOptions::default(),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedCalcType { .. }));
    }

    #[test]
    fn bigchem_rejects_non_dual_program_input() {
        let mut input = water_dual_input();
        input.kind = InputKind::ProgramInput;
        let err = plan(
            ProgramSelector::Bigchem,
            ComputeInputOrList::Single(Box::new(input)),
            ComputeOptions::default(),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::SchemaViolation(_)));
    }
}
