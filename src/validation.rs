//! Connection validation hooks.
//!
//! The graph always runs its built-in checks (existence, connectability,
//! direction, capacity) first. Validators registered with
//! [`Graph::add_validator`](crate::graph::Graph::add_validator) then run in
//! registration order and the first [`Verdict::Deny`] wins. A denial never
//! mutates the graph.

use std::fmt;

use crate::error::GraphError;
use crate::model::{Connection, Node, Port};

/// Outcome of a validation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Rejected with a human readable reason
    Deny(String),
}

impl Verdict {
    pub fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny(reason.into())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Combine two verdicts (AND logic): returns the first denial if any
    pub fn and(self, other: Verdict) -> Verdict {
        match self {
            Verdict::Allow => other,
            deny => deny,
        }
    }

    /// Map a denial to [`GraphError::ValidationDenied`].
    pub fn into_result(self) -> Result<(), GraphError> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Deny(reason) => Err(GraphError::ValidationDenied(reason)),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => f.write_str("allowed"),
            Verdict::Deny(reason) => write!(f, "denied: {}", reason),
        }
    }
}

/// A connection drag is about to start from `port` on `node`.
#[derive(Debug)]
pub struct StartContext<'a, D> {
    pub node: &'a Node<D>,
    pub port: &'a Port,
    /// Connections already attached to the port, either direction
    pub existing: Vec<&'a Connection>,
}

/// A connection is about to be committed.
#[derive(Debug)]
pub struct CompleteContext<'a, D> {
    pub candidate: &'a Connection,
    pub source_node: &'a Node<D>,
    pub source_port: &'a Port,
    pub target_node: &'a Node<D>,
    pub target_port: &'a Port,
    /// Connections already leaving the source port
    pub existing_on_source: Vec<&'a Connection>,
    /// Connections already arriving at the target port
    pub existing_on_target: Vec<&'a Connection>,
}

impl<D> CompleteContext<'_, D> {
    pub fn is_self_loop(&self) -> bool {
        self.source_node.id == self.target_node.id
    }
}

/// Custom rules for creating connections.
///
/// Both hooks default to [`Verdict::Allow`], so implementors only override
/// the stage they care about.
///
/// # Example
///
/// ```
/// use node_graph_core::validation::{CompleteContext, ConnectionValidator, Verdict};
///
/// struct SameTypeOnly;
///
/// impl<D> ConnectionValidator<D> for SameTypeOnly {
///     fn before_complete(&self, ctx: &CompleteContext<'_, D>) -> Verdict {
///         if ctx.source_node.node_type == ctx.target_node.node_type {
///             Verdict::Allow
///         } else {
///             Verdict::deny("node types differ")
///         }
///     }
/// }
/// ```
pub trait ConnectionValidator<D> {
    fn before_start(&self, _ctx: &StartContext<'_, D>) -> Verdict {
        Verdict::Allow
    }

    fn before_complete(&self, _ctx: &CompleteContext<'_, D>) -> Verdict {
        Verdict::Allow
    }
}

/// Rejects connections whose source and target are the same node.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSelfLoopsValidator;

impl<D> ConnectionValidator<D> for NoSelfLoopsValidator {
    fn before_complete(&self, ctx: &CompleteContext<'_, D>) -> Verdict {
        if ctx.is_self_loop() {
            Verdict::deny(format!("node {} cannot connect to itself", ctx.source_node.id))
        } else {
            Verdict::Allow
        }
    }
}

/// Rejects a second connection between the same pair of ports.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDuplicatesValidator;

impl<D> ConnectionValidator<D> for NoDuplicatesValidator {
    fn before_complete(&self, ctx: &CompleteContext<'_, D>) -> Verdict {
        let target = ctx.candidate.target();
        if ctx.existing_on_source.iter().any(|c| c.target() == target) {
            Verdict::deny("connection already exists")
        } else {
            Verdict::Allow
        }
    }
}

/// Completion check backed by a closure.
///
/// ```
/// use node_graph_core::validation::{FnValidator, Verdict};
///
/// let max_fan_out = FnValidator::new(|ctx: &node_graph_core::validation::CompleteContext<'_, ()>| {
///     if ctx.existing_on_source.len() >= 3 {
///         Verdict::deny("fan-out limit")
///     } else {
///         Verdict::Allow
///     }
/// });
/// # let _ = max_fan_out;
/// ```
pub struct FnValidator<F> {
    check: F,
}

impl<F> FnValidator<F> {
    pub fn new<D>(check: F) -> Self
    where
        F: Fn(&CompleteContext<'_, D>) -> Verdict,
    {
        Self { check }
    }
}

impl<D, F> ConnectionValidator<D> for FnValidator<F>
where
    F: Fn(&CompleteContext<'_, D>) -> Verdict,
{
    fn before_complete(&self, ctx: &CompleteContext<'_, D>) -> Verdict {
        (self.check)(ctx)
    }
}

/// Ordered composition of validators.
///
/// Every validator must allow the connection (AND logic). The first denial
/// short-circuits.
pub struct ValidatorChain<D> {
    validators: Vec<Box<dyn ConnectionValidator<D>>>,
}

impl<D> Default for ValidatorChain<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> ValidatorChain<D> {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Add a validator; validators run in the order they were added.
    pub fn add<V: ConnectionValidator<D> + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Append an already boxed validator.
    pub fn push(&mut self, validator: Box<dyn ConnectionValidator<D>>) {
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl<D> ConnectionValidator<D> for ValidatorChain<D> {
    fn before_start(&self, ctx: &StartContext<'_, D>) -> Verdict {
        for v in &self.validators {
            let verdict = v.before_start(ctx);
            if !verdict.is_allowed() {
                return verdict;
            }
        }
        Verdict::Allow
    }

    fn before_complete(&self, ctx: &CompleteContext<'_, D>) -> Verdict {
        for v in &self.validators {
            let verdict = v.before_complete(ctx);
            if !verdict.is_allowed() {
                return verdict;
            }
        }
        Verdict::Allow
    }
}
