//! Engine configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//! Callers choose the file format; the CLI reads TOML:
//!
//! ```toml
//! [template]
//! max_attempts = 250
//!
//! [random]
//! seed = 42
//! ```

use serde::{Deserialize, Serialize};

use crate::random::SeededRandom;
use crate::template::{TemplatePolicy, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub template: TemplateConfig,
    pub random: RandomConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    pub max_attempts: u32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        TemplateConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomConfig {
    /// Fixed seed for reproducible runs; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn template_policy(&self) -> TemplatePolicy {
        TemplatePolicy {
            max_attempts: self.template.max_attempts,
        }
    }

    pub fn random_source(&self) -> SeededRandom {
        match self.random.seed {
            Some(seed) => SeededRandom::new(seed),
            None => SeededRandom::from_entropy(),
        }
    }
}
