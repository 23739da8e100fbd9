//! Template instantiation: run template processing until every
//! `templateConstraint` holds or the retry bound is reached.

use tracing::{debug, warn};

use crate::diagnostics::DiagnosticKind;
use crate::expression::EvalEnv;
use crate::statement::{execute, ControlSignal};
use crate::types::{EngineError, ProcessingProgram, VariableContext};

/// Default retry bound for template regeneration.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Caller-owned regeneration policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplatePolicy {
    /// At least one attempt is always made.
    pub max_attempts: u32,
}

impl Default for TemplatePolicy {
    fn default() -> Self {
        TemplatePolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What happened during one instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateOutcome {
    pub attempts: u32,
    /// False when the last variant was kept with a failing constraint.
    pub satisfied: bool,
    /// Signal of the accepted run (`ExitTemplate` or `Continue` when satisfied).
    pub signal: ControlSignal,
}

/// Instantiate template variables.
///
/// Each attempt starts from the context as it was on entry, so declared
/// defaults and correct responses changed by a rejected variant do not
/// carry over. Template variables are then reset to their defaults and the
/// program re-runs. Random expressions draw fresh values from `env.random`
/// on every attempt.
pub fn instantiate_template(
    program: &ProcessingProgram,
    ctx: &mut VariableContext,
    env: &mut EvalEnv<'_>,
    policy: TemplatePolicy,
) -> Result<TemplateOutcome, EngineError> {
    let max_attempts = policy.max_attempts.max(1);
    let initial = ctx.clone();
    let mut attempts = 0;
    loop {
        attempts += 1;
        if attempts > 1 {
            ctx.clone_from(&initial);
        }
        ctx.reset_templates();
        let signal = execute(program, ctx, env)?;
        if signal != ControlSignal::ConstraintFailed {
            debug!(attempts, "template instantiated");
            return Ok(TemplateOutcome {
                attempts,
                satisfied: true,
                signal,
            });
        }
        if attempts >= max_attempts {
            warn!(attempts, "template constraint unsatisfied after retry bound; keeping last variant");
            env.diagnostics
                .record(DiagnosticKind::TemplateConstraintUnsatisfied { attempts });
            return Ok(TemplateOutcome {
                attempts,
                satisfied: false,
                signal,
            });
        }
        debug!(attempt = attempts, "template constraint failed, regenerating");
    }
}
