//! Response, outcome and template processing engine for assessment items.
//!
//! The engine interprets processing programs (statement trees over typed,
//! cardinality-aware variables) against a variable context. It consumes
//! the interchange JSON form of declarations and programs, not any
//! particular authoring format.
//!
//! Data conditions (NULL operands, division by zero, domain errors)
//! evaluate to NULL. Malformed programs surface as `EngineError`.

pub mod aggregate;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod expression;
pub mod lookup;
pub mod mapping;
pub mod numeric;
pub mod operators;
pub mod random;
pub mod session;
pub mod shape;
pub mod statement;
pub mod template;
pub mod types;

use std::collections::BTreeMap;

pub use config::EngineConfig;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use document::{bind_responses, variables_json, ItemDocument, TestDocument};
pub use expression::{eval_expr, EvalEnv};
pub use operators::{CustomOperator, OperatorRegistry};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use session::{ItemSession, SessionVariable, StaticTestSession, TestSessionProvider};
pub use statement::{execute, execute_statements, ControlSignal};
pub use template::{instantiate_template, TemplateOutcome, TemplatePolicy};
pub use types::{
    BaseType, Cardinality, EngineError, Expr, Phase, ProcessingProgram, Scalar, Statement, Value,
    VariableContext,
};

/// Result of processing one item attempt.
#[derive(Debug)]
pub struct ItemRun {
    pub context: VariableContext,
    /// `None` when the item has no template processing.
    pub template: Option<TemplateOutcome>,
    pub signal: ControlSignal,
    pub diagnostics: Diagnostics,
}

/// Result of test-level outcome processing.
#[derive(Debug)]
pub struct TestRun {
    pub context: VariableContext,
    pub signal: ControlSignal,
    pub diagnostics: Diagnostics,
}

/// Process one item attempt end to end.
///
/// 1. Build the variable context from the item's declarations
/// 2. Run template processing under `policy` (if present)
/// 3. Bind the candidate responses
/// 4. Run response processing
pub fn process_item(
    item: &ItemDocument,
    responses: &BTreeMap<String, serde_json::Value>,
    operators: &OperatorRegistry,
    random: &mut dyn RandomSource,
    policy: TemplatePolicy,
) -> Result<ItemRun, EngineError> {
    let mut diagnostics = Diagnostics::new();
    let mut context = item.context();
    let mut env = EvalEnv::new(operators, random, &mut diagnostics);
    let template = item.instantiate(&mut context, &mut env, policy)?;
    bind_responses(&mut context, responses)?;
    let signal = item.process_responses(&mut context, &mut env)?;
    Ok(ItemRun {
        context,
        template,
        signal,
        diagnostics,
    })
}

/// Run a test's outcome processing against a session.
pub fn process_test(
    test: &TestDocument,
    session: &dyn TestSessionProvider,
    operators: &OperatorRegistry,
    random: &mut dyn RandomSource,
) -> Result<TestRun, EngineError> {
    let mut diagnostics = Diagnostics::new();
    let mut context = test.context();
    let mut env = EvalEnv::new(operators, random, &mut diagnostics).with_session(session);
    let signal = test.process_outcomes(&mut context, &mut env)?;
    Ok(TestRun {
        context,
        signal,
        diagnostics,
    })
}
