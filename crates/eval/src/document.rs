//! Item and test documents: declarations bundled with their processing
//! programs, as read from interchange JSON.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::expression::EvalEnv;
use crate::statement::{execute, ControlSignal};
use crate::template::{instantiate_template, TemplateOutcome, TemplatePolicy};
use crate::types::{
    EngineError, OutcomeDeclaration, Phase, ProcessingProgram, ResponseDeclaration, Statement,
    TemplateDeclaration, Value, VariableContext,
};

// ──────────────────────────────────────────────
// Item
// ──────────────────────────────────────────────

/// One assessment item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawItemDocument")]
pub struct ItemDocument {
    pub identifier: Option<String>,
    pub response_declarations: Vec<ResponseDeclaration>,
    pub outcome_declarations: Vec<OutcomeDeclaration>,
    pub template_declarations: Vec<TemplateDeclaration>,
    pub template_processing: Option<ProcessingProgram>,
    pub response_processing: Option<ProcessingProgram>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawItemDocument {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    response_declarations: Vec<ResponseDeclaration>,
    #[serde(default)]
    outcome_declarations: Vec<OutcomeDeclaration>,
    #[serde(default)]
    template_declarations: Vec<TemplateDeclaration>,
    #[serde(default)]
    template_processing: Option<Vec<Statement>>,
    #[serde(default)]
    response_processing: Option<Vec<Statement>>,
}

impl TryFrom<RawItemDocument> for ItemDocument {
    type Error = EngineError;

    fn try_from(raw: RawItemDocument) -> Result<Self, Self::Error> {
        Ok(ItemDocument {
            identifier: raw.identifier,
            response_declarations: raw.response_declarations,
            outcome_declarations: raw.outcome_declarations,
            template_declarations: raw.template_declarations,
            template_processing: raw
                .template_processing
                .map(|s| ProcessingProgram::new(Phase::Template, s)),
            response_processing: raw
                .response_processing
                .map(|s| ProcessingProgram::new(Phase::Response, s)),
        })
    }
}

impl ItemDocument {
    /// Fresh variable context: the built-in variables plus every declaration.
    pub fn context(&self) -> VariableContext {
        let mut ctx = VariableContext::with_builtins();
        for d in &self.response_declarations {
            ctx.declare_response(d.clone());
        }
        for d in &self.outcome_declarations {
            ctx.declare_outcome(d.clone());
        }
        for d in &self.template_declarations {
            ctx.declare_template(d.clone());
        }
        ctx
    }

    /// Run template processing, if the item has any.
    pub fn instantiate(
        &self,
        ctx: &mut VariableContext,
        env: &mut EvalEnv<'_>,
        policy: TemplatePolicy,
    ) -> Result<Option<TemplateOutcome>, EngineError> {
        match &self.template_processing {
            Some(program) => instantiate_template(program, ctx, env, policy).map(Some),
            None => Ok(None),
        }
    }

    /// Reset outcomes to their defaults and run response processing.
    pub fn process_responses(
        &self,
        ctx: &mut VariableContext,
        env: &mut EvalEnv<'_>,
    ) -> Result<ControlSignal, EngineError> {
        ctx.reset_outcomes();
        match &self.response_processing {
            Some(program) => execute(program, ctx, env),
            None => Ok(ControlSignal::Continue),
        }
    }
}

/// Bind candidate responses given as JSON, keyed by response identifier.
/// Each value is parsed against the variable's declared signature.
pub fn bind_responses(
    ctx: &mut VariableContext,
    responses: &BTreeMap<String, serde_json::Value>,
) -> Result<(), EngineError> {
    for (identifier, json) in responses {
        let decl = ctx.response(identifier)?;
        let value = Value::from_json(json, decl.cardinality, decl.base_type)?;
        debug!(response = %identifier, value = %value, "binding response");
        ctx.set_value(identifier, value)?;
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Test
// ──────────────────────────────────────────────

/// Test-level outcome declarations and outcome processing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTestDocument")]
pub struct TestDocument {
    pub identifier: Option<String>,
    pub outcome_declarations: Vec<OutcomeDeclaration>,
    pub outcome_processing: Option<ProcessingProgram>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTestDocument {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    outcome_declarations: Vec<OutcomeDeclaration>,
    #[serde(default)]
    outcome_processing: Option<Vec<Statement>>,
}

impl TryFrom<RawTestDocument> for TestDocument {
    type Error = EngineError;

    fn try_from(raw: RawTestDocument) -> Result<Self, Self::Error> {
        Ok(TestDocument {
            identifier: raw.identifier,
            outcome_declarations: raw.outcome_declarations,
            outcome_processing: raw
                .outcome_processing
                .map(|s| ProcessingProgram::new(Phase::Outcome, s)),
        })
    }
}

impl TestDocument {
    pub fn context(&self) -> VariableContext {
        let mut ctx = VariableContext::new();
        for d in &self.outcome_declarations {
            ctx.declare_outcome(d.clone());
        }
        ctx
    }

    /// Reset outcomes and run outcome processing. `env` must carry the
    /// test session when the program uses test-level expressions.
    pub fn process_outcomes(
        &self,
        ctx: &mut VariableContext,
        env: &mut EvalEnv<'_>,
    ) -> Result<ControlSignal, EngineError> {
        ctx.reset_outcomes();
        match &self.outcome_processing {
            Some(program) => execute(program, ctx, env),
            None => Ok(ControlSignal::Continue),
        }
    }
}

// ──────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────

/// JSON snapshot of every variable, grouped by namespace.
pub fn variables_json(ctx: &VariableContext) -> serde_json::Value {
    serde_json::json!({
        "responses": group(ctx.response_values()),
        "outcomes": group(ctx.outcome_values()),
        "templates": group(ctx.template_values()),
    })
}

fn group<'a>(values: impl Iterator<Item = (&'a str, &'a Value)>) -> serde_json::Value {
    serde_json::Value::Object(values.map(|(id, v)| (id.to_string(), v.to_json())).collect())
}
