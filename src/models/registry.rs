//! Model registry for the evaluator.
//!
//! Defines the closed set of regressors a request may name, with their
//! accepted aliases and tunable hyperparameters. Request parsing and the
//! configuration loader resolve names here.

use super::ModelKind;

// ---------------------------------------------------------------------------
// Model metadata
// ---------------------------------------------------------------------------

pub struct ModelEntry {
    /// Canonical name, as reported in results.
    pub name: &'static str,
    /// Short names accepted in requests.
    pub aliases: &'static [&'static str],
    pub kind: ModelKind,
    pub description: &'static str,
    /// Hyperparameters the model accepts. Anything else is ignored with
    /// a warning.
    pub parameters: &'static [&'static str],
}

pub static MODEL_REGISTRY: &[ModelEntry] = &[
    ModelEntry {
        name: "random_forest",
        aliases: &["rf", "forest"],
        kind: ModelKind::RandomForest,
        description: "Bagged CART regression trees with bootstrap sampling. \
                      Robust default; importance from squared-error reduction.",
        parameters: super::forest::ForestParams::NAMES,
    },
    ModelEntry {
        name: "gradient_boosting",
        aliases: &["gb", "gbm", "boosting"],
        kind: ModelKind::GradientBoosting,
        description: "Shallow trees fitted on residuals with shrinkage and \
                      optional row subsampling.",
        parameters: super::boosting::BoostingParams::NAMES,
    },
    ModelEntry {
        name: "svr",
        aliases: &["svm", "support_vector"],
        kind: ModelKind::Svr,
        description: "Epsilon-insensitive support vector regression with an \
                      RBF kernel over standardized features.",
        parameters: super::kernel::SvrParams::NAMES,
    },
];

/// Canonical names of all registered models, in registry order.
pub fn all_model_names() -> Vec<&'static str> {
    MODEL_REGISTRY.iter().map(|m| m.name).collect()
}

/// Models that accept a given hyperparameter.
pub fn models_with_parameter(param: &str) -> Vec<&'static str> {
    MODEL_REGISTRY
        .iter()
        .filter(|m| m.parameters.contains(&param))
        .map(|m| m.name)
        .collect()
}

/// Looks up a model by canonical name or alias, ignoring case and
/// treating `-` like `_`. Returns `None` if not found.
pub fn find_model(name: &str) -> Option<&'static ModelEntry> {
    let key = name.trim().to_ascii_lowercase().replace('-', "_");
    MODEL_REGISTRY
        .iter()
        .find(|m| m.name == key || m.aliases.contains(&key.as_str()))
}

pub fn entry_for(kind: ModelKind) -> &'static ModelEntry {
    MODEL_REGISTRY
        .iter()
        .find(|m| m.kind == kind)
        .unwrap_or(&MODEL_REGISTRY[0])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelConfig;
    use serde_json::Value;

    #[test]
    fn test_no_duplicate_names_or_aliases() {
        let mut seen = std::collections::HashSet::new();
        for entry in MODEL_REGISTRY {
            for name in std::iter::once(&entry.name).chain(entry.aliases) {
                assert!(
                    seen.insert(*name),
                    "name '{}' registered twice in MODEL_REGISTRY",
                    name
                );
            }
        }
    }

    #[test]
    fn test_every_kind_has_exactly_one_entry() {
        for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting, ModelKind::Svr] {
            let count = MODEL_REGISTRY.iter().filter(|m| m.kind == kind).count();
            assert_eq!(count, 1, "{:?} should be registered once", kind);
            assert_eq!(entry_for(kind).kind, kind);
        }
    }

    #[test]
    fn test_find_model_accepts_aliases_and_case() {
        assert_eq!(find_model("rf").unwrap().name, "random_forest");
        assert_eq!(find_model("Gradient-Boosting").unwrap().name, "gradient_boosting");
        assert_eq!(find_model(" SVR ").unwrap().kind, ModelKind::Svr);
    }

    #[test]
    fn test_find_model_returns_none_for_unknown_name() {
        assert!(find_model("linear_regression").is_none());
    }

    #[test]
    fn test_listed_parameters_are_accepted_by_the_model() {
        for entry in MODEL_REGISTRY {
            for param in entry.parameters {
                let mut config = ModelConfig::default_for(entry.kind);
                let accepted = config
                    .set(param, &Value::from(1))
                    .unwrap_or_else(|e| panic!("{} rejected '{}': {}", entry.name, param, e));
                assert!(accepted, "{} does not accept listed '{}'", entry.name, param);
            }
        }
    }

    #[test]
    fn test_models_with_parameter() {
        assert_eq!(models_with_parameter("epsilon"), vec!["svr"]);
        assert_eq!(
            models_with_parameter("max_depth"),
            vec!["random_forest", "gradient_boosting"]
        );
    }
}
