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

use std::collections::{HashMap, HashSet};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use super::pairs::{Fact, NO_FACT};
use super::task::{Operator, Task, TaskError};

/// Two-valued compilation of a task over fact pairs. Every retained pair of
/// facts becomes one binary meta-atom; meta-atom 0 is the always-true anchor
/// ⟨∅⟩. The h^1 value of the compiled task equals the h^2 value of the
/// parent.
#[pyclass(frozen)]
#[derive(Debug, Clone)]
pub struct PiTwoTask {
    meta_atoms: Vec<(Fact, Fact)>,
    atom_index: HashMap<(Fact, Fact), usize>,
    fact_names: Vec<(String, String)>,
    operator_names: Vec<String>,
    parent_domain_sizes: Vec<i32>,
    task: Task,
}

impl PiTwoTask {
    pub fn compile(parent: &Task) -> Result<PiTwoTask, TaskError> {
        let num_vars = parent.domain_sizes.len();

        // Meta-atom enumeration: anchor first, then for each fact its
        // diagonal pair followed by all cross-variable pairs. Same-variable
        // pairs with differing values stay unmapped.
        let mut meta_atoms = vec![(NO_FACT, NO_FACT)];
        let mut fact_names = vec![(String::from("not v_∅"), String::from("v_∅"))];
        for v1 in 0..num_vars {
            for d1 in 0..parent.domain_sizes[v1] {
                let f1 = Fact::new(v1 as i32, d1);
                let single = format!("v_{}={}", v1, d1);
                meta_atoms.push((f1, f1));
                fact_names.push((format!("not {}", single), single.clone()));
                for v2 in v1 + 1..num_vars {
                    for d2 in 0..parent.domain_sizes[v2] {
                        meta_atoms.push((f1, Fact::new(v2 as i32, d2)));
                        let name = format!("{},{}={}", single, v2, d2);
                        fact_names.push((format!("not {}", name), name));
                    }
                }
            }
        }
        let atom_index: HashMap<(Fact, Fact), usize> = meta_atoms
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, i))
            .collect();
        let translate = |a: Fact, b: Fact| -> Option<Fact> {
            let key = if b < a { (b, a) } else { (a, b) };
            atom_index.get(&key).map(|&i| Fact::new(i as i32, 1))
        };

        let mut initial_state = vec![0; meta_atoms.len()];
        let goal_set: HashSet<Fact> = parent.goals.iter().copied().collect();
        let mut goals = Vec::new();
        for (i, (a, b)) in meta_atoms.iter().enumerate() {
            if holds_in(a, &parent.initial_state) && holds_in(b, &parent.initial_state) {
                initial_state[i] = 1;
            }
            if in_goal(a, &goal_set) && in_goal(b, &goal_set) {
                goals.push((i as i32, 1));
            }
        }

        let anchor = Fact::new(0, 1);
        let mut operators = Vec::new();
        let mut operator_names = Vec::new();
        for (op_id, op) in parent.operators.iter().enumerate() {
            let mut pre = op.preconditions.clone();
            pre.sort();
            let mut eff = op.effects.clone();
            eff.sort();
            let eff_vars: HashSet<i32> = eff.iter().map(|f| f.var).collect();

            let mut base_pre = vec![anchor];
            for i in 0..pre.len() {
                for j in i..pre.len() {
                    if let Some(m) = translate(pre[i], pre[j]) {
                        base_pre.push(m);
                    }
                }
            }
            let mut base_eff = Vec::new();
            for i in 0..eff.len() {
                for j in i..eff.len() {
                    if let Some(m) = translate(eff[i], eff[j]) {
                        base_eff.push(m);
                    }
                }
            }

            let name = format!("o_{},∅", op_id);
            operators.push(meta_operator(&name, &base_pre, &base_eff, op.cost));
            operator_names.push(name);

            // One meta-operator per context atom S on a variable the
            // operator leaves untouched and the preconditions allow.
            for var in 0..num_vars {
                if eff_vars.contains(&(var as i32)) {
                    continue;
                }
                for value in 0..parent.domain_sizes[var] {
                    let s = Fact::new(var as i32, value);
                    if pre.iter().any(|p| p.var == s.var && p.value != s.value) {
                        continue;
                    }
                    let mut ctx_pre = base_pre.clone();
                    if let Some(m) = translate(s, s) {
                        ctx_pre.push(m);
                    }
                    for &p in &pre {
                        if let Some(m) = translate(p, s) {
                            ctx_pre.push(m);
                        }
                    }
                    let mut ctx_eff = base_eff.clone();
                    for &e in &eff {
                        if let Some(m) = translate(e, s) {
                            ctx_eff.push(m);
                        }
                    }
                    let name = format!("o_{},{}={}", op_id, var, value);
                    operators.push(meta_operator(&name, &ctx_pre, &ctx_eff, op.cost));
                    operator_names.push(name);
                }
            }
        }

        let task = Task::new(
            vec![2; meta_atoms.len()],
            operators,
            initial_state,
            &goals,
            parent.has_axioms,
            parent.has_conditional_effects,
        )?;
        Ok(PiTwoTask {
            meta_atoms,
            atom_index,
            fact_names,
            operator_names,
            parent_domain_sizes: parent.domain_sizes.clone(),
            task,
        })
    }

    /// The compiled task itself, a plain two-valued task.
    pub fn compiled(&self) -> &Task {
        &self.task
    }

    pub fn num_meta_atoms(&self) -> usize {
        self.meta_atoms.len()
    }

    /// Index of the meta-atom for the unordered pair `{a, b}`, if mapped.
    pub fn atom_of(&self, a: Fact, b: Fact) -> Option<usize> {
        let key = if b < a { (b, a) } else { (a, b) };
        self.atom_index.get(&key).copied()
    }

    /// Rewrites a parent-state vector in place into the meta-state vector.
    pub fn convert_state_values_from_parent(&self, values: &mut Vec<i32>) {
        let mut new_values = vec![0; self.meta_atoms.len()];
        for (i, (a, b)) in self.meta_atoms.iter().enumerate() {
            if holds_in(a, values) && holds_in(b, values) {
                new_values[i] = 1;
            }
        }
        *values = new_values;
    }
}

fn holds_in(f: &Fact, values: &[i32]) -> bool {
    f.is_none() || values[f.var as usize] == f.value
}

fn in_goal(f: &Fact, goal_set: &HashSet<Fact>) -> bool {
    f.is_none() || goal_set.contains(f)
}

fn meta_operator(name: &str, pre: &[Fact], eff: &[Fact], cost: i32) -> Operator {
    let mut preconditions = pre.to_vec();
    preconditions.sort();
    preconditions.dedup();
    let mut effects = eff.to_vec();
    effects.sort();
    effects.dedup();
    Operator {
        name: name.to_string(),
        preconditions,
        effects,
        cost,
    }
}

#[pymethods]
impl PiTwoTask {
    #[new]
    fn py_new(parent: &Task) -> PyResult<Self> {
        PiTwoTask::compile(parent).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    #[getter]
    fn task(&self) -> Task {
        self.task.clone()
    }

    #[getter]
    fn num_variables(&self) -> usize {
        self.meta_atoms.len()
    }

    fn variable_name(&self, var: usize) -> PyResult<String> {
        self.fact_names
            .get(var)
            .map(|names| names.1.clone())
            .ok_or_else(|| PyValueError::new_err(format!("no meta-atom {}", var)))
    }

    fn fact_name(&self, fact: (i32, i32)) -> PyResult<String> {
        let (var, value) = fact;
        let names = self
            .fact_names
            .get(var as usize)
            .ok_or_else(|| PyValueError::new_err(format!("no meta-atom {}", var)))?;
        match value {
            0 => Ok(names.0.clone()),
            1 => Ok(names.1.clone()),
            _ => Err(PyValueError::new_err(format!(
                "meta-atoms are binary, got value {}",
                value
            ))),
        }
    }

    fn operator_name(&self, index: usize) -> PyResult<String> {
        self.operator_names
            .get(index)
            .cloned()
            .ok_or_else(|| PyValueError::new_err(format!("no meta-operator {}", index)))
    }

    fn get_num_operator_effect_conditions(&self, _op_index: usize, _eff_index: usize) -> usize {
        0
    }

    #[pyo3(name = "convert_state_values_from_parent")]
    fn py_convert_state_values_from_parent(&self, values: Vec<i32>) -> PyResult<Vec<i32>> {
        if values.len() != self.parent_domain_sizes.len() {
            return Err(PyValueError::new_err(format!(
                "state has {} values for {} parent variables",
                values.len(),
                self.parent_domain_sizes.len()
            )));
        }
        let mut values = values;
        self.convert_state_values_from_parent(&mut values);
        Ok(values)
    }

    fn __repr__(&self) -> String {
        format!(
            "PiTwoTask(meta_atoms={}, operators={})",
            self.meta_atoms.len(),
            self.task.operators.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Operator;

    fn parent() -> Task {
        // three binary variables, goals on the first two
        Task::new(
            vec![2, 2, 2],
            vec![
                Operator::new("a", &[], &[(0, 1)], 3),
                Operator::new("b", &[], &[(1, 1)], 4),
            ],
            vec![0, 0, 0],
            &[(0, 1), (1, 1)],
            false,
            false,
        )
        .unwrap()
    }

    #[test]
    fn atom_enumeration_is_anchor_diagonals_and_cross_pairs() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        // 1 anchor + 6 diagonals + 3 variable pairs * 4 value pairs
        assert_eq!(pi.num_meta_atoms(), 19);
        assert_eq!(pi.atom_of(NO_FACT, NO_FACT), Some(0));
        assert_eq!(pi.atom_of(Fact::new(0, 0), Fact::new(0, 0)), Some(1));
        // same variable, differing values: unmapped
        assert_eq!(pi.atom_of(Fact::new(0, 0), Fact::new(0, 1)), None);
        // unordered lookup
        assert_eq!(
            pi.atom_of(Fact::new(1, 1), Fact::new(0, 1)),
            pi.atom_of(Fact::new(0, 1), Fact::new(1, 1))
        );
    }

    #[test]
    fn compiled_task_is_binary() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        assert!(pi.compiled().domain_sizes.iter().all(|&s| s == 2));
        assert_eq!(pi.compiled().domain_sizes.len(), pi.num_meta_atoms());
    }

    #[test]
    fn initial_state_marks_satisfied_pairs() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        let init = &pi.compiled().initial_state;
        assert_eq!(init[0], 1);
        let a00 = pi.atom_of(Fact::new(0, 0), Fact::new(0, 0)).unwrap();
        let a01 = pi.atom_of(Fact::new(0, 1), Fact::new(0, 1)).unwrap();
        let both0 = pi.atom_of(Fact::new(0, 0), Fact::new(1, 0)).unwrap();
        assert_eq!(init[a00], 1);
        assert_eq!(init[a01], 0);
        assert_eq!(init[both0], 1);
    }

    #[test]
    fn goals_are_pairs_of_goal_facts() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        let goal_atoms: Vec<usize> = pi
            .compiled()
            .goals
            .iter()
            .map(|g| g.var as usize)
            .collect();
        let expected = vec![
            pi.atom_of(NO_FACT, NO_FACT).unwrap(),
            pi.atom_of(Fact::new(0, 1), Fact::new(0, 1)).unwrap(),
            pi.atom_of(Fact::new(0, 1), Fact::new(1, 1)).unwrap(),
            pi.atom_of(Fact::new(1, 1), Fact::new(1, 1)).unwrap(),
        ];
        let mut goal_atoms = goal_atoms;
        let mut expected = expected;
        goal_atoms.sort_unstable();
        expected.sort_unstable();
        assert_eq!(goal_atoms, expected);
    }

    #[test]
    fn operator_family_sizes() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        // per operator: S = ∅ plus one per value of the two untouched variables
        assert_eq!(pi.compiled().operators.len(), 2 * (1 + 4));
        assert_eq!(pi.operator_names[0], "o_0,∅");
        assert_eq!(pi.operator_names[1], "o_0,1=0");
        assert_eq!(pi.operator_names[5], "o_1,∅");
    }

    #[test]
    fn context_operators_carry_the_context_pair() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        // operator a with context v1=1: effect must include M(v0=1, v1=1)
        let op = pi
            .compiled()
            .operators
            .iter()
            .find(|o| o.name == "o_0,1=1")
            .unwrap();
        let pair_atom = pi.atom_of(Fact::new(0, 1), Fact::new(1, 1)).unwrap() as i32;
        let ctx_atom = pi.atom_of(Fact::new(1, 1), Fact::new(1, 1)).unwrap() as i32;
        assert!(op.effects.contains(&Fact::new(pair_atom, 1)));
        assert!(op.preconditions.contains(&Fact::new(ctx_atom, 1)));
        assert!(op.preconditions.contains(&Fact::new(0, 1)));
        assert_eq!(op.cost, 3);
    }

    #[test]
    fn state_translation_matches_initial_state() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        let mut values = vec![0, 0, 0];
        pi.convert_state_values_from_parent(&mut values);
        assert_eq!(&values, &pi.compiled().initial_state);
        let mut other = vec![1, 0, 1];
        pi.convert_state_values_from_parent(&mut other);
        let a01 = pi.atom_of(Fact::new(0, 1), Fact::new(0, 1)).unwrap();
        let pair = pi.atom_of(Fact::new(0, 1), Fact::new(2, 1)).unwrap();
        assert_eq!(other[a01], 1);
        assert_eq!(other[pair], 1);
        let unsat = pi.atom_of(Fact::new(1, 1), Fact::new(1, 1)).unwrap();
        assert_eq!(other[unsat], 0);
    }

    #[test]
    fn names_follow_the_convention() {
        let pi = PiTwoTask::compile(&parent()).unwrap();
        let a01 = pi.atom_of(Fact::new(0, 1), Fact::new(0, 1)).unwrap();
        let pair = pi.atom_of(Fact::new(0, 1), Fact::new(1, 0)).unwrap();
        assert_eq!(pi.fact_names[a01].1, "v_0=1");
        assert_eq!(pi.fact_names[a01].0, "not v_0=1");
        assert_eq!(pi.fact_names[pair].1, "v_0=1,1=0");
        assert_eq!(pi.fact_names[0].1, "v_∅");
    }
}
