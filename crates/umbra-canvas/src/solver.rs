//! Incremental constraint solver.
//!
//! Variables and constraints form a bipartite dependency graph. Changing a
//! variable queues only the constraints adjacent to it; solving a queued
//! constraint may change more variables, which queue their own neighbors.
//! Constraints never reached from a changed variable are not evaluated.

use crate::constraint::{Adjustment, Constraint, ConstraintId};
use crate::error::CanvasError;
use crate::variable::{Strength, VarId, Variable};
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Solver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum residual for a constraint to count as satisfied.
    pub tolerance: f64,
    /// Constraint evaluations allowed in one `solve` before giving up.
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Var(VarId),
    Constraint(ConstraintId),
}

#[derive(Debug, Clone)]
struct VarSlot {
    var: Variable,
    node: NodeIndex,
}

#[derive(Debug, Clone)]
struct Entry {
    constraint: Constraint,
    /// Candidate variables, least recently changed first.
    order: SmallVec<[VarId; 2]>,
    node: NodeIndex,
}

/// A value change made by the solver or by a caller: `(var, old, new)`.
pub type VarChange = (VarId, f64, f64);

#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    variables: HashMap<VarId, VarSlot>,
    constraints: BTreeMap<ConstraintId, Entry>,
    deps: StableUnGraph<Node, ()>,
    next_var: u32,
    next_constraint: u32,
    dirty: VecDeque<ConstraintId>,
    queued: HashSet<ConstraintId>,
    changes: Vec<VarChange>,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            variables: HashMap::new(),
            constraints: BTreeMap::new(),
            deps: StableUnGraph::default(),
            next_var: 0,
            next_constraint: 0,
            dirty: VecDeque::new(),
            queued: HashSet::new(),
            changes: Vec::new(),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    // ─── Variables ───────────────────────────────────────────────────────

    pub fn add_variable(&mut self, value: f64, strength: Strength) -> VarId {
        let id = VarId(self.next_var);
        self.next_var += 1;
        let node = self.deps.add_node(Node::Var(id));
        self.variables.insert(
            id,
            VarSlot {
                var: Variable::new(value, strength),
                node,
            },
        );
        id
    }

    /// Re-create a variable under a known id.
    pub fn insert_variable(&mut self, id: VarId, var: Variable) -> Result<(), CanvasError> {
        if self.variables.contains_key(&id) {
            return Err(CanvasError::InvalidState(format!(
                "variable {id:?} already exists"
            )));
        }
        self.next_var = self.next_var.max(id.0 + 1);
        let node = self.deps.add_node(Node::Var(id));
        self.variables.insert(id, VarSlot { var, node });
        Ok(())
    }

    /// Remove a variable. Fails while a constraint still refers to it.
    pub fn remove_variable(&mut self, id: VarId) -> Result<Variable, CanvasError> {
        let slot = self.slot(id)?;
        if self.deps.neighbors(slot.node).next().is_some() {
            return Err(CanvasError::InvalidState(format!(
                "variable {id:?} is still constrained"
            )));
        }
        let node = slot.node;
        self.deps.remove_node(node);
        self.variables
            .remove(&id)
            .map(|slot| slot.var)
            .ok_or_else(|| CanvasError::InvalidState(format!("unknown variable {id:?}")))
    }

    fn slot(&self, id: VarId) -> Result<&VarSlot, CanvasError> {
        self.variables
            .get(&id)
            .ok_or_else(|| CanvasError::InvalidState(format!("unknown variable {id:?}")))
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(&id).map(|s| &s.var)
    }

    pub fn value(&self, id: VarId) -> Result<f64, CanvasError> {
        self.slot(id).map(|s| s.var.value)
    }

    /// Set a value and queue every constraint depending on it.
    pub fn set_value(&mut self, id: VarId, value: f64) -> Result<(), CanvasError> {
        self.write(id, value)?;
        self.mark_changed(id, None);
        Ok(())
    }

    /// Set a value without queueing anything. Used when replaying history,
    /// where the restored values already satisfy the constraints.
    pub fn restore_value(&mut self, id: VarId, value: f64) -> Result<(), CanvasError> {
        self.write(id, value)
    }

    fn write(&mut self, id: VarId, value: f64) -> Result<(), CanvasError> {
        let slot = self
            .variables
            .get_mut(&id)
            .ok_or_else(|| CanvasError::InvalidState(format!("unknown variable {id:?}")))?;
        let old = slot.var.value;
        if old != value {
            slot.var.value = value;
            self.changes.push((id, old, value));
        }
        Ok(())
    }

    fn mark_changed(&mut self, id: VarId, except: Option<ConstraintId>) {
        let Some(slot) = self.variables.get(&id) else {
            return;
        };
        let neighbors: SmallVec<[ConstraintId; 8]> = self
            .deps
            .neighbors(slot.node)
            .filter_map(|n| match self.deps[n] {
                Node::Constraint(c) => Some(c),
                Node::Var(_) => None,
            })
            .collect();
        for c in neighbors {
            if let Some(entry) = self.constraints.get_mut(&c)
                && let Some(pos) = entry.order.iter().position(|v| *v == id)
            {
                let v = entry.order.remove(pos);
                entry.order.push(v);
            }
            if Some(c) != except {
                self.enqueue(c);
            }
        }
    }

    fn enqueue(&mut self, id: ConstraintId) {
        if self.queued.insert(id) {
            self.dirty.push_back(id);
        }
    }

    // ─── Constraints ─────────────────────────────────────────────────────

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, CanvasError> {
        let id = ConstraintId(self.next_constraint);
        self.insert_constraint(id, constraint)?;
        Ok(id)
    }

    /// Install a constraint under a known id and queue it.
    pub fn insert_constraint(
        &mut self,
        id: ConstraintId,
        constraint: Constraint,
    ) -> Result<(), CanvasError> {
        if self.constraints.contains_key(&id) {
            return Err(CanvasError::InvalidState(format!(
                "constraint {id:?} already exists"
            )));
        }
        let mut var_nodes: SmallVec<[NodeIndex; 6]> = SmallVec::new();
        for var in constraint.variables() {
            let node = self.slot(var)?.node;
            if !var_nodes.contains(&node) {
                var_nodes.push(node);
            }
        }

        self.next_constraint = self.next_constraint.max(id.0 + 1);
        let node = self.deps.add_node(Node::Constraint(id));
        for var_node in var_nodes {
            self.deps.add_edge(node, var_node, ());
        }
        let order = constraint.candidates();
        self.constraints.insert(
            id,
            Entry {
                constraint,
                order,
                node,
            },
        );
        self.enqueue(id);
        Ok(())
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Constraint, CanvasError> {
        let entry = self
            .constraints
            .remove(&id)
            .ok_or_else(|| CanvasError::InvalidState(format!("unknown constraint {id:?}")))?;
        self.deps.remove_node(entry.node);
        self.queued.remove(&id);
        Ok(entry.constraint)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id).map(|e| &e.constraint)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Constraints that read `var`.
    pub fn constraints_of(&self, var: VarId) -> Vec<ConstraintId> {
        let Some(slot) = self.variables.get(&var) else {
            return Vec::new();
        };
        let mut ids: Vec<ConstraintId> = self
            .deps
            .neighbors(slot.node)
            .filter_map(|n| match self.deps[n] {
                Node::Constraint(c) => Some(c),
                Node::Var(_) => None,
            })
            .collect();
        ids.sort();
        ids
    }

    // ─── Solving ─────────────────────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Work through the queued constraints until every one is satisfied.
    /// Returns the number of constraint evaluations.
    pub fn solve(&mut self) -> Result<usize, CanvasError> {
        let mut evaluations = 0;
        while let Some(id) = self.dirty.pop_front() {
            if !self.queued.remove(&id) {
                // removed after being queued
                continue;
            }
            evaluations += 1;
            if evaluations > self.config.max_iterations {
                self.clear_queue();
                log::warn!(
                    "solver gave up after {} evaluations",
                    self.config.max_iterations
                );
                return Err(CanvasError::NotConverged {
                    iterations: self.config.max_iterations,
                });
            }

            let adjustment = match self.evaluate(id) {
                Ok(Some(adjustment)) => adjustment,
                Ok(None) => continue,
                Err(err) => {
                    self.clear_queue();
                    return Err(err);
                }
            };
            for (var, value) in adjustment {
                self.write(var, value)?;
                self.mark_changed(var, Some(id));
            }
        }
        Ok(evaluations)
    }

    /// The adjustment needed to satisfy constraint `id`, if it is violated.
    fn evaluate(&self, id: ConstraintId) -> Result<Option<Adjustment>, CanvasError> {
        let Some(entry) = self.constraints.get(&id) else {
            return Ok(None);
        };
        let value = |v: VarId| self.variables.get(&v).map_or(0.0, |s| s.var.value);
        let strength = |v: VarId| {
            self.variables
                .get(&v)
                .map_or(Strength::Required, |s| s.var.strength)
        };
        if entry.constraint.is_satisfied(value, self.config.tolerance) {
            return Ok(None);
        }

        let target = entry
            .order
            .iter()
            .copied()
            .min_by_key(|v| strength(*v))
            .ok_or(CanvasError::Infeasible { constraint: id })?;
        let adjustment = entry.constraint.solve(value, target);
        if adjustment.iter().any(|(v, _)| strength(*v) == Strength::Required) {
            return Err(CanvasError::Infeasible { constraint: id });
        }
        Ok(Some(adjustment))
    }

    fn clear_queue(&mut self) {
        self.dirty.clear();
        self.queued.clear();
    }

    /// Value changes since the last drain, in the order they happened.
    pub fn drain_changes(&mut self) -> Vec<VarChange> {
        std::mem::take(&mut self.changes)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn changed_variable_propagates_through_chain() {
        let mut s = Solver::default();
        let a = s.add_variable(0.0, Strength::Normal);
        let b = s.add_variable(0.0, Strength::Normal);
        let c = s.add_variable(0.0, Strength::Normal);
        s.add_constraint(Constraint::Equals { a, b, delta: 5.0 }).unwrap();
        s.add_constraint(Constraint::Equals {
            a: b,
            b: c,
            delta: 5.0,
        })
        .unwrap();
        s.solve().unwrap();

        s.set_value(a, 10.0).unwrap();
        s.solve().unwrap();
        assert_eq!(s.value(a).unwrap(), 10.0);
        assert_eq!(s.value(b).unwrap(), 15.0);
        assert_eq!(s.value(c).unwrap(), 20.0);
    }

    #[test]
    fn only_reachable_constraints_are_evaluated() {
        let mut s = Solver::default();
        let vars: Vec<VarId> = (0..4).map(|_| s.add_variable(0.0, Strength::Normal)).collect();
        s.add_constraint(Constraint::Equals {
            a: vars[0],
            b: vars[1],
            delta: 0.0,
        })
        .unwrap();
        s.add_constraint(Constraint::Equals {
            a: vars[2],
            b: vars[3],
            delta: 0.0,
        })
        .unwrap();
        s.solve().unwrap();

        s.set_value(vars[0], 3.0).unwrap();
        let evaluations = s.solve().unwrap();
        assert_eq!(evaluations, 1);
        assert_eq!(s.value(vars[1]).unwrap(), 3.0);
        assert_eq!(s.value(vars[3]).unwrap(), 0.0);
    }

    #[test]
    fn weaker_variable_moves() {
        let mut s = Solver::default();
        let a = s.add_variable(1.0, Strength::Weak);
        let b = s.add_variable(2.0, Strength::Strong);
        s.add_constraint(Constraint::Equals { a, b, delta: 0.0 }).unwrap();
        s.solve().unwrap();
        assert_eq!(s.value(a).unwrap(), 2.0);
        assert_eq!(s.value(b).unwrap(), 2.0);
    }

    #[test]
    fn required_conflict_is_infeasible() {
        let mut s = Solver::default();
        let a = s.add_variable(1.0, Strength::Required);
        let b = s.add_variable(2.0, Strength::Required);
        let id = s.add_constraint(Constraint::Equals { a, b, delta: 0.0 }).unwrap();
        assert_eq!(s.solve(), Err(CanvasError::Infeasible { constraint: id }));
        assert!(!s.is_dirty());
    }

    #[test]
    fn contradictory_constraints_do_not_converge() {
        let mut s = Solver::new(SolverConfig {
            max_iterations: 50,
            ..SolverConfig::default()
        });
        let a = s.add_variable(0.0, Strength::Normal);
        let b = s.add_variable(0.0, Strength::Normal);
        s.add_constraint(Constraint::Equals { a, b, delta: 0.0 }).unwrap();
        s.add_constraint(Constraint::Equals { a, b, delta: 10.0 }).unwrap();
        assert_eq!(s.solve(), Err(CanvasError::NotConverged { iterations: 50 }));
    }

    #[test]
    fn constrained_variable_cannot_be_removed() {
        let mut s = Solver::default();
        let a = s.add_variable(0.0, Strength::Normal);
        let b = s.add_variable(0.0, Strength::Normal);
        let id = s.add_constraint(Constraint::Equals { a, b, delta: 0.0 }).unwrap();
        assert!(s.remove_variable(a).is_err());

        s.remove_constraint(id).unwrap();
        assert!(s.constraints_of(a).is_empty());
        assert!(s.remove_variable(a).is_ok());
        assert_eq!(s.constraint_count(), 0);
    }

    #[test]
    fn changes_are_recorded_in_order() {
        let mut s = Solver::default();
        let a = s.add_variable(0.0, Strength::Normal);
        let b = s.add_variable(0.0, Strength::Normal);
        s.add_constraint(Constraint::Equals { a, b, delta: 0.0 }).unwrap();
        s.set_value(a, 4.0).unwrap();
        s.solve().unwrap();
        assert_eq!(s.drain_changes(), vec![(a, 0.0, 4.0), (b, 0.0, 4.0)]);
        assert!(s.drain_changes().is_empty());
    }
}
