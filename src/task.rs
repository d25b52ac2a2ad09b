// Copyright (C) 2025 PSO Unit, Fondazione Bruno Kessler
// This file is part of H2Lite.
//
// H2Lite is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// H2Lite is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.
//

use itertools::Itertools;
use std::collections::HashSet;
use thiserror::Error;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use super::pairs::Fact;

/// Violations of the task façade contract, reported at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("variable {var} declares an empty domain")]
    EmptyDomain { var: usize },
    #[error("initial state has {got} values for {expected} variables")]
    InitialStateLength { got: usize, expected: usize },
    #[error("initial state assigns {value} to variable {var}, outside its domain")]
    InitialStateValue { var: usize, value: i32 },
    #[error("operator `{op}` has cost {cost} below zero")]
    NegativeCost { op: String, cost: i32 },
    #[error("operator `{op}` refers to fact ({var}, {value}) outside the declared ranges")]
    FactOutOfRange { op: String, var: i32, value: i32 },
    #[error("operator `{op}` constrains variable {var} twice")]
    DuplicateVariable { op: String, var: i32 },
    #[error("goal refers to fact ({var}, {value}) outside the declared ranges")]
    GoalOutOfRange { var: i32, value: i32 },
    #[error("goal constrains variable {var} twice")]
    DuplicateGoal { var: i32 },
}

#[pyclass(frozen)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operator {
    pub name: String,
    pub preconditions: Vec<Fact>,
    pub effects: Vec<Fact>,
    pub cost: i32,
}

impl Operator {
    pub fn new(name: &str, preconditions: &[(i32, i32)], effects: &[(i32, i32)], cost: i32) -> Operator {
        Operator {
            name: name.to_string(),
            preconditions: preconditions.iter().map(|&(v, d)| Fact::new(v, d)).collect(),
            effects: effects.iter().map(|&(v, d)| Fact::new(v, d)).collect(),
            cost,
        }
    }
}

#[pymethods]
impl Operator {
    #[new]
    fn py_new(name: String, preconditions: Vec<(i32, i32)>, effects: Vec<(i32, i32)>, cost: i32) -> Self {
        Operator::new(&name, &preconditions, &effects, cost)
    }

    #[getter]
    fn name(&self) -> String {
        self.name.to_string()
    }

    #[getter]
    fn preconditions(&self) -> Vec<(i32, i32)> {
        self.preconditions.iter().map(|f| (f.var, f.value)).collect()
    }

    #[getter]
    fn effects(&self) -> Vec<(i32, i32)> {
        self.effects.iter().map(|f| (f.var, f.value)).collect()
    }

    #[getter]
    fn cost(&self) -> i32 {
        self.cost
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self)
    }
}

/// Read-only view of a finite-domain planning task: variables with their
/// domain sizes, operators, one total initial state and a partial goal.
#[pyclass(frozen)]
#[derive(Debug, Clone)]
pub struct Task {
    pub domain_sizes: Vec<i32>,
    pub operators: Vec<Operator>,
    pub initial_state: Vec<i32>,
    pub goals: Vec<Fact>,
    pub has_axioms: bool,
    pub has_conditional_effects: bool,
}

impl Task {
    pub fn new(
        domain_sizes: Vec<i32>,
        operators: Vec<Operator>,
        initial_state: Vec<i32>,
        goals: &[(i32, i32)],
        has_axioms: bool,
        has_conditional_effects: bool,
    ) -> Result<Task, TaskError> {
        for (var, &size) in domain_sizes.iter().enumerate() {
            if size <= 0 {
                return Err(TaskError::EmptyDomain { var });
            }
        }
        if initial_state.len() != domain_sizes.len() {
            return Err(TaskError::InitialStateLength {
                got: initial_state.len(),
                expected: domain_sizes.len(),
            });
        }
        for (var, &value) in initial_state.iter().enumerate() {
            if value < 0 || value >= domain_sizes[var] {
                return Err(TaskError::InitialStateValue { var, value });
            }
        }
        for op in &operators {
            if op.cost < 0 {
                return Err(TaskError::NegativeCost {
                    op: op.name.clone(),
                    cost: op.cost,
                });
            }
            check_fact_list(&domain_sizes, &op.name, &op.preconditions)?;
            check_fact_list(&domain_sizes, &op.name, &op.effects)?;
        }
        let mut goal_facts = Vec::with_capacity(goals.len());
        let mut goal_vars = HashSet::new();
        for &(var, value) in goals {
            if !fact_in_range(&domain_sizes, Fact::new(var, value)) {
                return Err(TaskError::GoalOutOfRange { var, value });
            }
            if !goal_vars.insert(var) {
                return Err(TaskError::DuplicateGoal { var });
            }
            goal_facts.push(Fact::new(var, value));
        }
        Ok(Task {
            domain_sizes,
            operators,
            initial_state,
            goals: goal_facts,
            has_axioms,
            has_conditional_effects,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn is_goal_state(&self, state: &[i32]) -> bool {
        self.goals
            .iter()
            .all(|g| state.get(g.var as usize) == Some(&g.value))
    }
}

fn fact_in_range(domain_sizes: &[i32], f: Fact) -> bool {
    f.var >= 0
        && (f.var as usize) < domain_sizes.len()
        && f.value >= 0
        && f.value < domain_sizes[f.var as usize]
}

fn check_fact_list(domain_sizes: &[i32], op: &str, facts: &[Fact]) -> Result<(), TaskError> {
    let mut seen = HashSet::new();
    for &f in facts {
        if !fact_in_range(domain_sizes, f) {
            return Err(TaskError::FactOutOfRange {
                op: op.to_string(),
                var: f.var,
                value: f.value,
            });
        }
        if !seen.insert(f.var) {
            return Err(TaskError::DuplicateVariable {
                op: op.to_string(),
                var: f.var,
            });
        }
    }
    Ok(())
}

/// The fact tuple of a total state, one fact per variable in index order.
pub fn state_facts(state: &[i32]) -> Vec<Fact> {
    state
        .iter()
        .enumerate()
        .map(|(var, &value)| Fact::new(var as i32, value))
        .collect()
}

#[pymethods]
impl Task {
    #[new]
    #[pyo3(signature = (domain_sizes, operators, initial_state, goals, has_axioms=false, has_conditional_effects=false))]
    fn py_new(
        domain_sizes: Vec<i32>,
        operators: Vec<Operator>,
        initial_state: Vec<i32>,
        goals: Vec<(i32, i32)>,
        has_axioms: bool,
        has_conditional_effects: bool,
    ) -> PyResult<Self> {
        Task::new(
            domain_sizes,
            operators,
            initial_state,
            &goals,
            has_axioms,
            has_conditional_effects,
        )
        .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    #[getter(num_variables)]
    fn py_num_variables(&self) -> usize {
        self.domain_sizes.len()
    }

    #[getter]
    fn domain_sizes(&self) -> Vec<i32> {
        self.domain_sizes.clone()
    }

    #[getter]
    fn initial_state(&self) -> Vec<i32> {
        self.initial_state.clone()
    }

    #[getter]
    fn goals(&self) -> Vec<(i32, i32)> {
        self.goals.iter().map(|g| (g.var, g.value)).collect()
    }

    #[getter]
    fn operators(&self) -> Vec<Operator> {
        self.operators.clone()
    }

    #[getter]
    fn has_axioms(&self) -> bool {
        self.has_axioms
    }

    #[getter]
    fn has_conditional_effects(&self) -> bool {
        self.has_conditional_effects
    }

    #[pyo3(name = "is_goal_state")]
    fn py_is_goal_state(&self, state: Vec<i32>) -> bool {
        self.is_goal_state(&state)
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(variables={}, operators={}, goals={})",
            self.domain_sizes.len(),
            self.operators.len(),
            self.goals.len()
        )
    }
}

/// Normalized operator view consumed by the solvers: precondition and effect
/// tuples sorted by `(var, value)`.
#[derive(Debug, Clone)]
pub struct GroundOperator {
    pub preconditions: Vec<Fact>,
    pub effects: Vec<Fact>,
    pub cost: i32,
}

#[derive(Debug, Clone)]
pub struct GroundedTask {
    pub domain_sizes: Vec<i32>,
    pub operators: Vec<GroundOperator>,
}

impl GroundedTask {
    pub fn forward(task: &Task) -> GroundedTask {
        let operators = task
            .operators
            .iter()
            .map(|op| {
                let mut preconditions = op.preconditions.clone();
                preconditions.sort();
                let mut effects = op.effects.clone();
                effects.sort();
                GroundOperator {
                    preconditions,
                    effects,
                    cost: op.cost,
                }
            })
            .collect();
        GroundedTask {
            domain_sizes: task.domain_sizes.clone(),
            operators,
        }
    }

    /// Regression view of the task: each operator swaps preconditions and
    /// effects. An effect variable with no declared precondition is padded
    /// with one operator copy per domain value first, so that the reversed
    /// operator restores a definite value on every variable it touches.
    pub fn reversed(task: &Task) -> GroundedTask {
        let mut operators = Vec::new();
        for op in &task.operators {
            let eff_vars: HashSet<i32> = op.effects.iter().map(|f| f.var).collect();
            let pre_vars: HashSet<i32> = op.preconditions.iter().map(|f| f.var).collect();
            let prevail: Vec<Fact> = op
                .preconditions
                .iter()
                .filter(|f| !eff_vars.contains(&f.var))
                .copied()
                .collect();
            let consumed: Vec<Fact> = op
                .preconditions
                .iter()
                .filter(|f| eff_vars.contains(&f.var))
                .copied()
                .collect();
            let mut free_vars: Vec<i32> = op
                .effects
                .iter()
                .map(|f| f.var)
                .filter(|v| !pre_vars.contains(v))
                .collect();
            free_vars.sort_unstable();

            let mut preconditions: Vec<Fact> =
                op.effects.iter().chain(prevail.iter()).copied().collect();
            preconditions.sort();

            if free_vars.is_empty() {
                let mut effects = consumed.clone();
                effects.sort();
                operators.push(GroundOperator {
                    preconditions,
                    effects,
                    cost: op.cost,
                });
            } else {
                for values in free_vars
                    .iter()
                    .map(|&v| 0..task.domain_sizes[v as usize])
                    .multi_cartesian_product()
                {
                    let mut effects = consumed.clone();
                    effects.extend(
                        free_vars
                            .iter()
                            .zip(values.iter())
                            .map(|(&v, &d)| Fact::new(v, d)),
                    );
                    effects.sort();
                    operators.push(GroundOperator {
                        preconditions: preconditions.clone(),
                        effects,
                        cost: op.cost,
                    });
                }
            }
        }
        GroundedTask {
            domain_sizes: task.domain_sizes.clone(),
            operators,
        }
    }
}
