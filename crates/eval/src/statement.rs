//! Statement execution.
//!
//! Every statement list returns a `ControlSignal`. Anything other than
//! `Continue` stops the remaining statements of the list and is handed back
//! through every enclosing list (condition branches, fragments, the
//! program) to the caller.
//!
//! Writes are checked against the program's phase: response variables are
//! writable only in response processing, template variables only in
//! template processing. Outcome variables are writable in every phase.

use tracing::debug;

use crate::expression::{eval_expr, EvalEnv};
use crate::lookup;
use crate::types::{
    Condition, EngineError, Expr, Phase, ProcessingProgram, Scalar, Statement, Value,
    VariableContext, VariableNamespace,
};

/// Result of executing a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    ExitResponse,
    ExitTemplate,
    ExitTest,
    /// A `templateConstraint` evaluated to false or NULL.
    ConstraintFailed,
}

impl ControlSignal {
    pub fn is_continue(self) -> bool {
        self == ControlSignal::Continue
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlSignal::Continue => "continue",
            ControlSignal::ExitResponse => "exitResponse",
            ControlSignal::ExitTemplate => "exitTemplate",
            ControlSignal::ExitTest => "exitTest",
            ControlSignal::ConstraintFailed => "constraintFailed",
        }
    }
}

/// Execute one phase's program against the context.
pub fn execute(
    program: &ProcessingProgram,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<ControlSignal, EngineError> {
    debug!(phase = %program.phase, statements = program.statements.len(), "executing program");
    let signal = execute_statements(&program.statements, program.phase, ctx, env)?;
    debug!(phase = %program.phase, signal = ?signal, "program finished");
    Ok(signal)
}

/// Execute a bare statement list in the given phase.
pub fn execute_statements(
    statements: &[Statement],
    phase: Phase,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<ControlSignal, EngineError> {
    for statement in statements {
        let signal = execute_statement(statement, phase, ctx, env)?;
        if !signal.is_continue() {
            return Ok(signal);
        }
    }
    Ok(ControlSignal::Continue)
}

fn execute_statement(
    statement: &Statement,
    phase: Phase,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<ControlSignal, EngineError> {
    debug!(phase = %phase, statement = statement.kind(), "statement");
    match statement {
        Statement::ResponseCondition(cond)
        | Statement::OutcomeCondition(cond)
        | Statement::TemplateCondition(cond) => execute_condition(cond, phase, ctx, env),

        Statement::SetOutcomeValue {
            identifier,
            expression,
        } => {
            ctx.outcome(identifier)?;
            assign(identifier, expression, phase, ctx, env)
        }
        Statement::SetResponseValue {
            identifier,
            expression,
        } => {
            ctx.response(identifier)?;
            assign(identifier, expression, phase, ctx, env)
        }
        Statement::SetTemplateValue {
            identifier,
            expression,
        } => {
            ctx.template(identifier)?;
            assign(identifier, expression, phase, ctx, env)
        }

        Statement::SetCorrectResponse {
            identifier,
            expression,
        } => {
            require_phase(statement, Phase::Template, phase)?;
            ctx.response(identifier)?;
            let value = eval_expr(expression, ctx, env)?;
            ctx.set_correct_response(identifier, value)?;
            Ok(ControlSignal::Continue)
        }

        Statement::SetDefaultValue {
            identifier,
            expression,
        } => {
            match expression {
                Some(expression) => {
                    require_phase(statement, Phase::Template, phase)?;
                    let value = eval_expr(expression, ctx, env)?;
                    ctx.set_default_value(identifier, value)?;
                }
                None => {
                    check_writable(identifier, phase, ctx)?;
                    ctx.reset_to_default(identifier)?;
                }
            }
            Ok(ControlSignal::Continue)
        }

        Statement::LookupOutcomeValue {
            identifier,
            expression,
        } => {
            let source = eval_expr(expression, ctx, env)?;
            let table = ctx
                .outcome(identifier)?
                .lookup_table
                .as_ref()
                .ok_or_else(|| EngineError::MissingLookupTable {
                    identifier: identifier.clone(),
                })?;
            let value = lookup::resolve(table, &source)?;
            ctx.set_value(identifier, value)?;
            Ok(ControlSignal::Continue)
        }

        Statement::TemplateConstraint { expression } => {
            require_phase(statement, Phase::Template, phase)?;
            if truth(&eval_expr(expression, ctx, env)?)? {
                Ok(ControlSignal::Continue)
            } else {
                debug!("template constraint not satisfied");
                Ok(ControlSignal::ConstraintFailed)
            }
        }

        Statement::ExitResponse => Ok(ControlSignal::ExitResponse),
        Statement::ExitTemplate => Ok(ControlSignal::ExitTemplate),
        Statement::ExitTest => Ok(ControlSignal::ExitTest),

        Statement::ResponseProcessingFragment { statements } => {
            execute_statements(statements, phase, ctx, env)
        }
    }
}

/// First branch whose condition holds runs; a NULL condition is false.
fn execute_condition(
    cond: &Condition,
    phase: Phase,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<ControlSignal, EngineError> {
    let branches = std::iter::once(&cond.if_branch).chain(&cond.else_if_branches);
    for branch in branches {
        if truth(&eval_expr(&branch.condition, ctx, env)?)? {
            return execute_statements(&branch.statements, phase, ctx, env);
        }
    }
    match &cond.else_branch {
        Some(statements) => execute_statements(statements, phase, ctx, env),
        None => Ok(ControlSignal::Continue),
    }
}

fn truth(value: &Value) -> Result<bool, EngineError> {
    match value {
        v if v.is_null() => Ok(false),
        Value::Single(Scalar::Boolean(b)) => Ok(*b),
        other => Err(EngineError::NonBooleanCondition {
            got: other.describe(),
        }),
    }
}

fn assign(
    identifier: &str,
    expression: &Expr,
    phase: Phase,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<ControlSignal, EngineError> {
    check_writable(identifier, phase, ctx)?;
    let value = eval_expr(expression, ctx, env)?;
    ctx.set_value(identifier, value)?;
    Ok(ControlSignal::Continue)
}

fn check_writable(identifier: &str, phase: Phase, ctx: &VariableContext) -> Result<(), EngineError> {
    let writable = match ctx.namespace_of(identifier) {
        None => {
            return Err(EngineError::UndeclaredVariable {
                identifier: identifier.to_string(),
            })
        }
        Some(VariableNamespace::Outcome) => true,
        Some(VariableNamespace::Response) => phase == Phase::Response,
        Some(VariableNamespace::Template) => phase == Phase::Template,
    };
    if writable {
        Ok(())
    } else {
        Err(EngineError::ReadOnlyVariable {
            identifier: identifier.to_string(),
            phase,
        })
    }
}

fn require_phase(statement: &Statement, required: Phase, phase: Phase) -> Result<(), EngineError> {
    if phase == required {
        Ok(())
    } else {
        Err(EngineError::StatementNotPermitted {
            statement: statement.kind(),
            phase,
        })
    }
}
