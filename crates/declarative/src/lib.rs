//! # Declarative
//!
//! A reconciliation engine for declaratively managed resources.
//!
//! Given a desired set of typed resources and the actual state observed
//! from a backend, it computes the changes needed to converge the two and
//! applies them through backend-specific handlers.
//!
//! ## Core Concepts
//!
//! - **Resource**: a typed, versioned, named object (`apiVersion`, `kind`, `metadata`, `spec`)
//! - **Selector**: a predicate including or excluding resources from a run
//! - **Extension**: a pluggable collector, controller, transformation, validation,
//!   converter, action or health indicator, registered in an [`ExtensionRegistry`]
//! - **ResourceChange**: the diff for one resource (`ADD`, `UPDATE`, `DELETE`, `NONE`)
//! - **ChangeExecutor**: applies changes in parallel and reports one result per change
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExtensionRegistry, ReconcileContext, Reconciler};
//! use std::sync::Arc;
//!
//! let mut registry = ExtensionRegistry::new();
//! declarative::builtin::register(&mut registry)?;
//! my_provider::register(&mut registry)?;
//!
//! let reconciler = Reconciler::new(Arc::new(registry));
//! let ctx = ReconcileContext::new(configuration)?;
//! let changes = reconciler.plan(resources.clone(), &ctx)?;
//! let results = reconciler.reconcile(resources, &ctx)?;
//! ```
//!
//! ## Provider Traits
//!
//! Backends plug in by implementing the category traits in [`extension`]
//! and [`ChangeHandler`]; the CLI plugs in through [`ProgressCallback`]
//! and [`ConfirmCallback`]. Nothing here depends on a particular backend
//! client or UI.

pub mod builtin;
pub mod chain;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod extension;
pub mod planner;
pub mod registry;
pub mod resource;
pub mod selector;
pub mod types;

// Re-export main types at crate root
pub use chain::{ConverterChain, Interceptor, TransformationChain, ValidationChain};
pub use config::{ConfigError, ConfigProperty, Configuration};
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, ReconcileContext,
};
pub use diff::{ChangeComputer, ChangeFactory, DiffSummary, SpecChangeFactory, group_by_type};
pub use error::{Error, Result, ValidationError};
pub use executor::{ChangeExecutor, ChangeHandler, NoneHandler};
pub use extension::{
    Accepts, Action, ActionOutcome, Collector, Controller, Converter, Extension,
    ExtensionCategory, FailurePolicy, Health, HealthIndicator, HealthStatus, Transformation,
    TypeMatcher, Validation, ValidationOutcome,
};
pub use planner::{ExecutionPlan, PlannedGroup, Reconciler};
pub use registry::{ExtensionDescriptor, ExtensionRegistry};
pub use resource::{ObjectMeta, Resource, ResourceList, ResourceType, annotations};
pub use selector::{
    AggregateSelector, ExpressionSelector, LabelSelector, NO_SELECTOR, NoSelector,
    PredicateSelector, Selector, SelectorError, SelectorMatchingStrategy, SharedSelector,
    parse_expressions,
};
pub use types::{
    ChangeResponse, ChangeResult, ChangeStatus, ExecuteOptions, ExecuteSummary, Operation,
    ResourceChange, StateChange,
};
