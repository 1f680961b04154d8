//! The optimization-model seam.
//!
//! Components only register bounded variables and named linear constraints;
//! expressions are `good_lp` expressions over `good_lp` variable handles.
//! Anything that implements [`OptimizationModel`] can receive an agent's step
//! model, [`LinearModel`] is the in-memory implementation used by the builder
//! and the one the reference dispatcher solves.

mod linear;

pub use good_lp::{Expression, Variable as VarId};
pub use linear::{LinearModel, Violation};

use std::fmt;

use good_lp::IntoAffineExpression;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Energy carrier a variable contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Electricity,
    Heat,
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Carrier::Electricity => write!(f, "electricity"),
            Carrier::Heat => write!(f, "heat"),
        }
    }
}

/// A bounded decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub integral: bool,
    /// `None` for bookkeeping variables such as tracking targets and slacks.
    pub carrier: Option<Carrier>,
}

impl Variable {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            integral: true,
            carrier: None,
        }
    }

    pub fn pinned(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, value)
    }

    pub fn on(mut self, carrier: Carrier) -> Self {
        self.carrier = Some(carrier);
        self
    }

    pub fn integral(mut self, integral: bool) -> Self {
        self.integral = integral;
        self
    }

    /// Largest absolute value the variable can take.
    pub fn magnitude(&self) -> f64 {
        self.lower.abs().max(self.upper.abs())
    }
}

/// Direction of a constraint relative to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    LessEqual,
    GreaterEqual,
    Equal,
}

/// A named linear relation `terms + constant (<=|>=|==) 0`.
///
/// Built from `good_lp` expressions; the right-hand side is moved to the
/// left on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
    pub sense: Sense,
}

impl Constraint {
    pub fn new(name: impl Into<String>, expr: Expression, sense: Sense) -> Self {
        let constant = expr.constant();
        let terms = expr
            .linear_coefficients()
            .into_iter()
            .filter(|(_, coeff)| *coeff != 0.0)
            .collect();
        Self {
            name: name.into(),
            terms,
            constant,
            sense,
        }
    }

    /// `lhs <= rhs`.
    pub fn leq(
        name: impl Into<String>,
        lhs: impl IntoAffineExpression,
        rhs: impl IntoAffineExpression,
    ) -> Self {
        Self::new(name, lhs.into_expression() - rhs.into_expression(), Sense::LessEqual)
    }

    /// `lhs >= rhs`.
    pub fn geq(
        name: impl Into<String>,
        lhs: impl IntoAffineExpression,
        rhs: impl IntoAffineExpression,
    ) -> Self {
        Self::new(
            name,
            lhs.into_expression() - rhs.into_expression(),
            Sense::GreaterEqual,
        )
    }

    /// `lhs == rhs`.
    pub fn equals(
        name: impl Into<String>,
        lhs: impl IntoAffineExpression,
        rhs: impl IntoAffineExpression,
    ) -> Self {
        Self::new(name, lhs.into_expression() - rhs.into_expression(), Sense::Equal)
    }

    /// Coefficient of `var` once the right-hand side is moved left.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Left-hand side under `value_of`, `None` if a variable has no value.
    pub fn evaluate(&self, mut value_of: impl FnMut(VarId) -> Option<f64>) -> Option<f64> {
        let mut total = self.constant;
        for (var, coeff) in &self.terms {
            total += coeff * value_of(*var)?;
        }
        Some(total)
    }
}

/// Container that components register into.
pub trait OptimizationModel {
    /// Registers a variable and returns its handle.
    ///
    /// Fails with [`ModelError::DuplicateName`] if the name is taken and with
    /// [`ModelError::Bounds`] if `lower > upper`.
    fn add_variable(&mut self, variable: Variable) -> Result<VarId, ModelError>;

    /// Registers a constraint under its name.
    fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ModelError>;

    /// Looks up a registered variable by name.
    fn variable(&self, name: &str) -> Option<VarId>;
}
