use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use good_lp::{
    IntoAffineExpression, ProblemVariables, Solution, SolverModel, constraint, microlp, variable,
};
use tracing::debug;

use super::{Carrier, Constraint, Expression, OptimizationModel, Sense, VarId, Variable};
use crate::error::ModelError;

const TOLERANCE: f64 = 1e-6;

/// In-memory model that records variables and constraints by name.
///
/// Holds exactly one agent's step. Handles are minted from a `good_lp`
/// [`ProblemVariables`]; [`LinearModel::solve`] re-declares every variable
/// into a fresh problem, so a model can be inspected and solved any number
/// of times.
pub struct LinearModel {
    problem: ProblemVariables,
    variables: Vec<Variable>,
    handles: Vec<VarId>,
    by_name: HashMap<String, usize>,
    by_handle: HashMap<VarId, usize>,
    constraints: Vec<Constraint>,
    constraint_names: HashSet<String>,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self {
            problem: ProblemVariables::new(),
            variables: Vec::new(),
            handles: Vec::new(),
            by_name: HashMap::new(),
            by_handle: HashMap::new(),
            constraints: Vec::new(),
            constraint_names: HashSet::new(),
        }
    }
}

impl fmt::Debug for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearModel")
            .field("variables", &self.variables)
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// One way an assignment fails to satisfy the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Missing { variable: String },
    OutOfBounds { variable: String, value: f64 },
    NotIntegral { variable: String, value: f64 },
    Constraint { constraint: String, lhs: f64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing { variable } => write!(f, "no value for `{variable}`"),
            Violation::OutOfBounds { variable, value } => {
                write!(f, "`{variable}` = {value} is outside its bounds")
            }
            Violation::NotIntegral { variable, value } => {
                write!(f, "`{variable}` = {value} is not integral")
            }
            Violation::Constraint { constraint, lhs } => {
                write!(f, "constraint `{constraint}` violated (lhs = {lhs})")
            }
        }
    }
}

fn definition(var: &Variable) -> good_lp::VariableDefinition {
    let def = variable().min(var.lower).max(var.upper).name(var.name.clone());
    if var.integral { def.integer() } else { def }
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.by_name.get(name).map(|&i| &self.variables[i])
    }

    /// The declaration behind a handle issued by this model.
    pub fn declaration(&self, var: VarId) -> Option<&Variable> {
        self.by_handle.get(&var).map(|&i| &self.variables[i])
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// `(lower, upper)` of the named variable.
    pub fn bounds(&self, name: &str) -> Option<(f64, f64)> {
        self.get(name).map(|v| (v.lower, v.upper))
    }

    /// Sum over all variables on `carrier` of their largest absolute bound.
    pub fn carrier_magnitude(&self, carrier: Carrier) -> f64 {
        self.variables
            .iter()
            .filter(|v| v.carrier == Some(carrier))
            .map(Variable::magnitude)
            .sum()
    }

    pub fn carriers(&self) -> impl Iterator<Item = Carrier> {
        self.variables
            .iter()
            .filter_map(|v| v.carrier)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
    }

    /// Rewrites `terms + constant` over the handles of a freshly declared
    /// problem.
    fn rebind(
        &self,
        fresh: &[VarId],
        terms: impl IntoIterator<Item = (VarId, f64)>,
        constant: f64,
    ) -> Result<Expression, ModelError> {
        let mut expr = constant.into_expression();
        for (var, coeff) in terms {
            let i = self
                .by_handle
                .get(&var)
                .ok_or_else(|| ModelError::UnknownVariable(format!("{var:?}")))?;
            expr += coeff * fresh[*i];
        }
        Ok(expr)
    }

    /// Minimises `objective` over the model with the `microlp` solver and
    /// returns the value of every variable by name.
    ///
    /// Integral variables are rounded to the nearest integer.
    pub fn solve(&self, objective: Expression) -> Result<BTreeMap<String, f64>, ModelError> {
        let mut vars = ProblemVariables::new();
        let fresh: Vec<VarId> = self
            .variables
            .iter()
            .map(|v| vars.add(definition(v)))
            .collect();

        let constant = objective.constant();
        let objective = self.rebind(&fresh, objective.linear_coefficients(), constant)?;

        let mut problem = vars.minimise(objective).using(microlp);
        for c in &self.constraints {
            let lhs = self.rebind(&fresh, c.terms.iter().copied(), c.constant)?;
            problem = problem.with(match c.sense {
                Sense::LessEqual => constraint::leq(lhs, 0.0),
                Sense::GreaterEqual => constraint::geq(lhs, 0.0),
                Sense::Equal => constraint::eq(lhs, 0.0),
            });
        }

        let solution = problem
            .solve()
            .map_err(|e| ModelError::Solver(e.to_string()))?;

        Ok(self
            .variables
            .iter()
            .zip(&fresh)
            .map(|(v, &handle)| {
                let value = solution.value(handle);
                let value = if v.integral { value.round() } else { value };
                (v.name.clone(), value)
            })
            .collect())
    }

    /// Checks a by-name assignment against every bound, integrality flag and
    /// constraint. An empty result means the assignment is feasible.
    ///
    /// Constraint slack is relative to the magnitude of the terms involved,
    /// so a `±M` balancing slack does not trip on solver round-off.
    pub fn check_assignment(&self, values: &BTreeMap<String, f64>) -> Vec<Violation> {
        let mut violations = Vec::new();

        for var in &self.variables {
            let Some(&value) = values.get(&var.name) else {
                violations.push(Violation::Missing {
                    variable: var.name.clone(),
                });
                continue;
            };
            let slack = TOLERANCE * (1.0 + value.abs());
            if value < var.lower - slack || value > var.upper + slack {
                violations.push(Violation::OutOfBounds {
                    variable: var.name.clone(),
                    value,
                });
            }
            if var.integral && (value - value.round()).abs() > TOLERANCE {
                violations.push(Violation::NotIntegral {
                    variable: var.name.clone(),
                    value,
                });
            }
        }

        for constraint in &self.constraints {
            let value_of = |id: VarId| {
                self.declaration(id)
                    .and_then(|v| values.get(&v.name))
                    .copied()
            };
            let Some(lhs) = constraint.evaluate(value_of) else {
                // Already reported as missing above.
                continue;
            };
            let scale: f64 = constraint
                .terms
                .iter()
                .filter_map(|(id, coeff)| value_of(*id).map(|x| (coeff * x).abs()))
                .sum::<f64>()
                + constraint.constant.abs();
            let slack = TOLERANCE * (1.0 + scale);
            let satisfied = match constraint.sense {
                Sense::LessEqual => lhs <= slack,
                Sense::GreaterEqual => lhs >= -slack,
                Sense::Equal => lhs.abs() <= slack,
            };
            if !satisfied {
                violations.push(Violation::Constraint {
                    constraint: constraint.name.clone(),
                    lhs,
                });
            }
        }

        violations
    }
}

impl OptimizationModel for LinearModel {
    fn add_variable(&mut self, variable: Variable) -> Result<VarId, ModelError> {
        if self.by_name.contains_key(&variable.name) {
            return Err(ModelError::DuplicateName(variable.name));
        }
        if !variable.lower.is_finite()
            || !variable.upper.is_finite()
            || variable.lower > variable.upper
        {
            return Err(ModelError::bounds(format!(
                "variable `{}` has invalid bounds [{}, {}]",
                variable.name, variable.lower, variable.upper
            )));
        }

        debug!(
            name = %variable.name,
            lower = variable.lower,
            upper = variable.upper,
            integral = variable.integral,
            "registered variable"
        );

        let handle = self.problem.add(definition(&variable));
        let index = self.variables.len();
        self.by_name.insert(variable.name.clone(), index);
        self.by_handle.insert(handle, index);
        self.handles.push(handle);
        self.variables.push(variable);
        Ok(handle)
    }

    fn add_constraint(&mut self, mut constraint: Constraint) -> Result<(), ModelError> {
        if self.constraint_names.contains(&constraint.name) {
            return Err(ModelError::DuplicateName(constraint.name));
        }
        if let Some((var, _)) = constraint
            .terms
            .iter()
            .find(|(var, _)| !self.by_handle.contains_key(var))
        {
            return Err(ModelError::UnknownVariable(format!(
                "{var:?} in constraint `{}`",
                constraint.name
            )));
        }

        // registration order, independent of the expression's hash order
        constraint
            .terms
            .sort_by_key(|(var, _)| self.by_handle.get(var).copied().unwrap_or(usize::MAX));
        debug!(name = %constraint.name, "registered constraint");

        self.constraint_names.insert(constraint.name.clone());
        self.constraints.push(constraint);
        Ok(())
    }

    fn variable(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).map(|&i| self.handles[i])
    }
}
