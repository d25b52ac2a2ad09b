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

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::{collections::HashMap, vec::Vec};

use tracing::{info, warn};

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use super::pairs::{all_pairs, Fact, Pair};
use super::task::{state_facts, GroundOperator, GroundedTask, Task};

/// Sentinel returned by `compute` for states from which no goal is reachable.
pub const DEAD_END: i32 = i32::MAX;

const INFTY: i32 = i32::MAX;

fn add_costs(a: i32, b: i32) -> i32 {
    if a == INFTY || b == INFTY {
        INFTY
    } else {
        a.saturating_add(b)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct OperatorID {
    id: usize,
}

impl OperatorID {
    fn new(id: usize) -> OperatorID {
        OperatorID { id }
    }
}

#[pyclass(frozen)]
#[derive(Clone)]
pub struct Heuristic {
    htwo: Option<HTwoHeuristic>,
    hmax: Option<HMaxHeuristic>,
    description: String,
}

#[pymethods]
impl Heuristic {
    /// Forward h^2: the pairwise delete relaxation evaluated from each state
    /// towards the goal.
    #[staticmethod]
    #[pyo3(signature = (task, cache_estimates=false, description=None, verbosity=None))]
    pub fn h2(
        task: &Task,
        cache_estimates: bool,
        description: Option<String>,
        verbosity: Option<String>,
    ) -> PyResult<Self> {
        let description = description.unwrap_or_else(|| String::from("h2"));
        preamble(&description, "h^2", task, &verbosity);
        Ok(Heuristic {
            htwo: Some(HTwoHeuristic::forward(task, cache_estimates)),
            hmax: None,
            description,
        })
    }

    /// Dual h^2: the same solver run on the regression of the task, from the
    /// goal towards each state.
    #[staticmethod]
    #[pyo3(signature = (task, cache_estimates=false, description=None, verbosity=None))]
    pub fn h2_dual(
        task: &Task,
        cache_estimates: bool,
        description: Option<String>,
        verbosity: Option<String>,
    ) -> PyResult<Self> {
        let description = description.unwrap_or_else(|| String::from("h2_dual"));
        preamble(&description, "dual h^2", task, &verbosity);
        Ok(Heuristic {
            htwo: Some(HTwoHeuristic::backward(task, cache_estimates)),
            hmax: None,
            description,
        })
    }

    /// h^1 (hmax): the single-fact critical-path relaxation.
    #[staticmethod]
    #[pyo3(signature = (task, cache_estimates=false, description=None, verbosity=None))]
    pub fn hmax(
        task: &Task,
        cache_estimates: bool,
        description: Option<String>,
        verbosity: Option<String>,
    ) -> PyResult<Self> {
        let description = description.unwrap_or_else(|| String::from("hmax"));
        preamble(&description, "h^max", task, &verbosity);
        Ok(Heuristic {
            htwo: None,
            hmax: Some(HMaxHeuristic::new(task, cache_estimates)),
            description,
        })
    }

    /// Evaluates the heuristic for a state given as one value per variable.
    /// Returns `None` for detected dead ends.
    pub fn eval(&self, state: Vec<i32>) -> PyResult<Option<i32>> {
        let domain_sizes = if let Some(h) = &self.htwo {
            &h.domain_sizes
        } else if let Some(h) = &self.hmax {
            &h.domain_sizes
        } else {
            return Ok(Some(0));
        };
        check_state(domain_sizes, &state)?;
        let h_value = if let Some(h) = &self.htwo {
            h.compute(&state)
        } else {
            self.hmax.as_ref().unwrap().compute(&state)
        };
        if h_value == DEAD_END {
            Ok(None)
        } else {
            Ok(Some(h_value))
        }
    }

    pub fn dead_ends_are_reliable(&self) -> bool {
        if let Some(h) = &self.htwo {
            h.dead_ends_are_reliable()
        } else if let Some(h) = &self.hmax {
            h.dead_ends_are_reliable()
        } else {
            true
        }
    }

    pub fn name(&self) -> String {
        self.description.clone()
    }
}

fn preamble(description: &str, variant: &str, task: &Task, verbosity: &Option<String>) {
    if verbosity.as_deref() == Some("silent") {
        return;
    }
    info!(
        "{}: using {} over {} variables and {} operators",
        description,
        variant,
        task.domain_sizes.len(),
        task.operators.len()
    );
}

fn check_state(domain_sizes: &[i32], state: &[i32]) -> PyResult<()> {
    if state.len() != domain_sizes.len() {
        return Err(PyValueError::new_err(format!(
            "state has {} values for {} variables",
            state.len(),
            domain_sizes.len()
        )));
    }
    for (var, &value) in state.iter().enumerate() {
        if value < 0 || value >= domain_sizes[var] {
            return Err(PyValueError::new_err(format!(
                "state assigns {} to variable {}, outside its domain",
                value, var
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CachedOperator {
    preconditions: Vec<Fact>,
    partial_effects: Vec<Pair>,
    touches_var: Vec<bool>,
    cost: i32,
}

/// h^2 over one task view. The forward and the dual variant are two
/// instances of this struct, differing only in the grounded operators they
/// were built from and in which side of the evaluation varies per state.
#[derive(Debug, Clone)]
pub struct HTwoHeuristic {
    domain_sizes: Vec<i32>,
    operators: Vec<CachedOperator>,
    op_dict: HashMap<Fact, Vec<OperatorID>>,
    goals: Vec<Fact>,
    goal_tuple: Vec<Fact>,
    seed_facts: Vec<Fact>,
    backward: bool,
    dead_ends_reliable: bool,
    internal_caching: Arc<Mutex<Option<HashMap<Vec<i32>, i32>>>>,
}

impl HTwoHeuristic {
    pub fn forward(task: &Task, cache_estimates: bool) -> HTwoHeuristic {
        Self::build(task, GroundedTask::forward(task), false, cache_estimates)
    }

    pub fn backward(task: &Task, cache_estimates: bool) -> HTwoHeuristic {
        Self::build(task, GroundedTask::reversed(task), true, cache_estimates)
    }

    fn build(
        task: &Task,
        grounded: GroundedTask,
        backward: bool,
        cache_estimates: bool,
    ) -> HTwoHeuristic {
        let dead_ends_reliable = !task.has_axioms && !task.has_conditional_effects;
        if !dead_ends_reliable {
            warn!("axioms or conditional effects are ignored; reported dead ends are not reliable");
        }
        let num_vars = grounded.domain_sizes.len();
        let mut operators = Vec::with_capacity(grounded.operators.len());
        let mut op_dict: HashMap<Fact, Vec<OperatorID>> = HashMap::new();
        for (id, op) in grounded.operators.iter().enumerate() {
            let mut touches_var = vec![false; num_vars];
            for f in &op.effects {
                touches_var[f.var as usize] = true;
            }
            operators.push(CachedOperator {
                preconditions: op.preconditions.clone(),
                partial_effects: all_pairs(&op.effects),
                touches_var,
                cost: op.cost,
            });
            if op.preconditions.is_empty() {
                // always applicable: must be revisited whenever any entry drops
                for var in 0..num_vars {
                    for value in 0..grounded.domain_sizes[var] {
                        op_dict
                            .entry(Fact::new(var as i32, value))
                            .or_default()
                            .push(OperatorID::new(id));
                    }
                }
            } else {
                for f in &op.preconditions {
                    op_dict.entry(*f).or_default().push(OperatorID::new(id));
                }
            }
        }
        let mut goal_tuple = task.goals.clone();
        goal_tuple.sort();
        let seed_facts = if backward {
            goal_compatible_facts(task)
        } else {
            Vec::new()
        };
        HTwoHeuristic {
            domain_sizes: grounded.domain_sizes,
            operators,
            op_dict,
            goals: task.goals.clone(),
            goal_tuple,
            seed_facts,
            backward,
            dead_ends_reliable,
            internal_caching: Arc::new(Mutex::new(if cache_estimates {
                Some(HashMap::new())
            } else {
                None
            })),
        }
    }

    /// Evaluates the heuristic for a state, returning `DEAD_END` when no
    /// goal-reaching plan exists under the pairwise relaxation.
    pub fn compute(&self, state: &[i32]) -> i32 {
        if self
            .goals
            .iter()
            .all(|g| state[g.var as usize] == g.value)
        {
            return 0;
        }
        let mut internal_caching = self.internal_caching.lock().unwrap();
        if let Some(cache) = internal_caching.as_ref() {
            if let Some(&h) = cache.get(state) {
                return h;
            }
        }
        let h = if self.backward {
            let tuple = state_facts(state);
            let mut propagator = Propagator::new(self, &self.seed_facts);
            propagator.run();
            propagator.eval(&tuple)
        } else {
            let seed = state_facts(state);
            let mut propagator = Propagator::new(self, &seed);
            propagator.run();
            propagator.eval(&self.goal_tuple)
        };
        if let Some(cache) = internal_caching.as_mut() {
            cache.insert(state.to_vec(), h);
        }
        h
    }

    pub fn dead_ends_are_reliable(&self) -> bool {
        self.dead_ends_reliable
    }
}

/// All facts the goal does not rule out: the goal value where one is set,
/// the whole domain elsewhere. Seeds the dual table.
fn goal_compatible_facts(task: &Task) -> Vec<Fact> {
    let goal_by_var: HashMap<i32, i32> = task.goals.iter().map(|g| (g.var, g.value)).collect();
    let mut facts = Vec::new();
    for var in 0..task.domain_sizes.len() {
        match goal_by_var.get(&(var as i32)) {
            Some(&value) => facts.push(Fact::new(var as i32, value)),
            None => {
                for value in 0..task.domain_sizes[var] {
                    facts.push(Fact::new(var as i32, value));
                }
            }
        }
    }
    facts
}

fn lookup(table: &HashMap<Pair, i32>, p: &Pair) -> i32 {
    table.get(p).copied().unwrap_or(INFTY)
}

/// Maximum table value over all pairs generated from `tuple`, together with
/// the pairs attaining it. A maximum of 0 returns an empty critical set,
/// since those entries cannot drop further.
fn eval_pairs(table: &HashMap<Pair, i32>, tuple: &[Fact]) -> (i32, HashSet<Pair>) {
    let mut max = 0;
    let mut critical = HashSet::new();
    for i in 0..tuple.len() {
        for j in i..tuple.len() {
            let p = if i == j {
                Pair::singleton(tuple[i])
            } else {
                Pair::of(tuple[i], tuple[j])
            };
            let v = lookup(table, &p);
            if v > max {
                max = v;
                critical.clear();
                critical.insert(p);
            } else if v == max && max > 0 {
                critical.insert(p);
            }
        }
    }
    (max, critical)
}

/// One h^2 evaluation: the pair table seeded from a fact set, the operator
/// worklist, and the critical entries that wake operators when they drop.
/// Fresh per state; the operator caches and `op_dict` are shared.
struct Propagator<'a> {
    domain_sizes: &'a [i32],
    operators: &'a [CachedOperator],
    op_dict: &'a HashMap<Fact, Vec<OperatorID>>,
    table: HashMap<Pair, i32>,
    queue: VecDeque<usize>,
    in_queue: Vec<bool>,
    op_cost: Vec<i32>,
    critical: Vec<HashSet<Pair>>,
}

impl<'a> Propagator<'a> {
    fn new(heuristic: &'a HTwoHeuristic, seed: &[Fact]) -> Propagator<'a> {
        let seed_set: HashSet<Fact> = seed.iter().copied().collect();
        let num_vars = heuristic.domain_sizes.len();
        let mut table = HashMap::new();
        for i in 0..num_vars {
            for j in 0..heuristic.domain_sizes[i] {
                let f = Fact::new(i as i32, j);
                let f_in = seed_set.contains(&f);
                table.insert(Pair::singleton(f), if f_in { 0 } else { INFTY });
                for k in i + 1..num_vars {
                    for l in 0..heuristic.domain_sizes[k] {
                        let g = Fact::new(k as i32, l);
                        let both_in = f_in && seed_set.contains(&g);
                        table.insert(Pair::of(f, g), if both_in { 0 } else { INFTY });
                    }
                }
            }
        }

        let num_ops = heuristic.operators.len();
        let mut queue = VecDeque::new();
        let mut in_queue = vec![false; num_ops];
        let mut op_cost = vec![INFTY; num_ops];
        let mut critical = vec![HashSet::new(); num_ops];
        for (id, op) in heuristic.operators.iter().enumerate() {
            let (cost, crit) = eval_pairs(&table, &op.preconditions);
            op_cost[id] = cost;
            critical[id] = crit;
            if cost == 0 {
                queue.push_back(id);
                in_queue[id] = true;
            }
        }

        Propagator {
            domain_sizes: &heuristic.domain_sizes,
            operators: &heuristic.operators,
            op_dict: &heuristic.op_dict,
            table,
            queue,
            in_queue,
            op_cost,
            critical,
        }
    }

    fn run(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            self.in_queue[id] = false;
            let c1 = self.op_cost[id];
            if c1 == INFTY {
                continue;
            }
            let ops = self.operators;
            let op = &ops[id];
            for &p in &op.partial_effects {
                self.propose(p, add_costs(c1, op.cost));
                if p.is_singleton() {
                    self.extend(op, p.first, c1);
                }
            }
        }
    }

    fn eval(&self, tuple: &[Fact]) -> i32 {
        eval_pairs(&self.table, tuple).0
    }

    /// Lowers the entry for `p` if `val` improves it and wakes the
    /// subscribed operators on a strict decrease.
    fn propose(&mut self, p: Pair, val: i32) {
        let improved = match self.table.get_mut(&p) {
            Some(slot) if val < *slot => {
                *slot = val;
                true
            }
            _ => false,
        };
        if improved {
            self.wake(p);
        }
    }

    /// Pairs the effect fact `f` of an operator with every reached fact on a
    /// variable the operator leaves untouched.
    fn extend(&mut self, op: &CachedOperator, f: Fact, c1: i32) {
        let domain_sizes = self.domain_sizes;
        for var in 0..domain_sizes.len() {
            if op.touches_var[var] {
                continue;
            }
            for value in 0..domain_sizes[var] {
                let x = Fact::new(var as i32, value);
                if lookup(&self.table, &Pair::singleton(x)) == INFTY {
                    continue;
                }
                let extended = Pair::of(f, x);
                if lookup(&self.table, &extended) <= c1 {
                    continue;
                }
                let c2 = self.extend_eval(x, &op.preconditions, c1);
                if c2 != INFTY {
                    self.propose(extended, add_costs(c2, op.cost));
                }
            }
        }
    }

    /// Evaluation of `pre` extended with `x`, given that `pre` alone
    /// evaluates to `v`.
    fn extend_eval(&self, x: Fact, pre: &[Fact], v: i32) -> i32 {
        for f in pre {
            if f.var == x.var && f.value != x.value {
                return INFTY;
            }
        }
        let mut max = v.max(lookup(&self.table, &Pair::singleton(x)));
        if max == INFTY {
            return INFTY;
        }
        for f in pre {
            if f.var == x.var {
                continue;
            }
            max = max.max(lookup(&self.table, &Pair::of(*f, x)));
            if max == INFTY {
                return INFTY;
            }
        }
        max
    }

    /// Fan-out after the entry for `p` dropped: every operator subscribed to
    /// a component fact is re-queued; operators whose critical set just
    /// emptied get their precondition cost recomputed. Entries of a critical
    /// set all hold the operator's current precondition maximum, so that
    /// cost cannot have changed earlier.
    fn wake(&mut self, p: Pair) {
        let ops = self.operators;
        let op_dict = self.op_dict;
        let facts = [p.first, p.second];
        let count = if p.is_singleton() { 1 } else { 2 };
        for fact in &facts[..count] {
            let Some(subscribers) = op_dict.get(fact) else {
                continue;
            };
            for oid in subscribers {
                let id = oid.id;
                if self.critical[id].remove(&p) && self.critical[id].is_empty() {
                    let (cost, crit) = eval_pairs(&self.table, &ops[id].preconditions);
                    self.op_cost[id] = cost;
                    self.critical[id] = crit;
                }
                if !self.in_queue[id] {
                    self.in_queue[id] = true;
                    self.queue.push_back(id);
                }
            }
        }
    }
}

/// h^1 over single facts, the m = 1 member of the same family. Also the
/// consumer-side witness for Pi^2-compiled tasks, whose h^1 equals the
/// parent's h^2.
#[derive(Debug, Clone)]
pub struct HMaxHeuristic {
    domain_sizes: Vec<i32>,
    operators: Vec<GroundOperator>,
    precondition_of: HashMap<Fact, Vec<OperatorID>>,
    empty_pre_operators: Vec<OperatorID>,
    goals: Vec<Fact>,
    dead_ends_reliable: bool,
    internal_caching: Arc<Mutex<Option<HashMap<Vec<i32>, i32>>>>,
}

impl HMaxHeuristic {
    pub fn new(task: &Task, cache_estimates: bool) -> HMaxHeuristic {
        let dead_ends_reliable = !task.has_axioms && !task.has_conditional_effects;
        if !dead_ends_reliable {
            warn!("axioms or conditional effects are ignored; reported dead ends are not reliable");
        }
        let grounded = GroundedTask::forward(task);
        let mut precondition_of: HashMap<Fact, Vec<OperatorID>> = HashMap::new();
        let mut empty_pre_operators = Vec::new();
        for (id, op) in grounded.operators.iter().enumerate() {
            if op.preconditions.is_empty() {
                empty_pre_operators.push(OperatorID::new(id));
            }
            for f in &op.preconditions {
                precondition_of
                    .entry(*f)
                    .or_default()
                    .push(OperatorID::new(id));
            }
        }
        HMaxHeuristic {
            domain_sizes: grounded.domain_sizes,
            operators: grounded.operators,
            precondition_of,
            empty_pre_operators,
            goals: task.goals.clone(),
            dead_ends_reliable,
            internal_caching: Arc::new(Mutex::new(if cache_estimates {
                Some(HashMap::new())
            } else {
                None
            })),
        }
    }

    pub fn compute(&self, state: &[i32]) -> i32 {
        if self
            .goals
            .iter()
            .all(|g| state[g.var as usize] == g.value)
        {
            return 0;
        }
        let mut internal_caching = self.internal_caching.lock().unwrap();
        if let Some(cache) = internal_caching.as_ref() {
            if let Some(&h) = cache.get(state) {
                return h;
            }
        }

        let mut costs: HashMap<Fact, i32> = HashMap::new();
        let mut changed = state_facts(state);
        for f in &changed {
            costs.insert(*f, 0);
        }
        while !changed.is_empty() {
            let mut candidates = self.empty_pre_operators.clone();
            for f in &changed {
                if let Some(ids) = self.precondition_of.get(f) {
                    candidates.extend(ids.iter().copied());
                }
            }
            candidates.sort_by_key(|o| o.id);
            candidates.dedup();
            changed.clear();
            let mut new_costs: HashMap<Fact, i32> = HashMap::new();
            for oid in candidates {
                let op = &self.operators[oid.id];
                if let Some(c) = cost_of(&op.preconditions, &costs) {
                    let total = add_costs(c, op.cost);
                    for k in &op.effects {
                        let current = new_costs
                            .get(k)
                            .copied()
                            .or_else(|| costs.get(k).copied());
                        if current.map_or(true, |v| total < v) {
                            new_costs.insert(*k, total);
                            changed.push(*k);
                        }
                    }
                }
            }
            for (k, v) in new_costs {
                costs.insert(k, v);
            }
        }

        let h = cost_of(&self.goals, &costs).unwrap_or(DEAD_END);
        if let Some(cache) = internal_caching.as_mut() {
            cache.insert(state.to_vec(), h);
        }
        h
    }

    pub fn dead_ends_are_reliable(&self) -> bool {
        self.dead_ends_reliable
    }
}

/// Maximum reached cost over `tuple`, or `None` if any fact is unreached.
fn cost_of(tuple: &[Fact], costs: &HashMap<Fact, i32>) -> Option<i32> {
    let mut res = 0;
    for f in tuple {
        match costs.get(f) {
            Some(&c) => res = res.max(c),
            None => return None,
        }
    }
    Some(res)
}
