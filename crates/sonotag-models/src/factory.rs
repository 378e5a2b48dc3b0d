//! Model factory for creating model instances from configuration.

use crate::{LinearSoftmaxModel, MockModel};
use serde::{Deserialize, Serialize};
use sonotag_abstraction::{Model, ModelError, ModelSpec};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error};

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Mock model for testing.
    Mock,
    /// Time-pooled linear softmax classifier.
    #[default]
    Linear,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "linear" | "linear_softmax" | "logreg" => Ok(Self::Linear),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model of the given type shaped for `spec`.
    ///
    /// # Errors
    /// Returns `ModelError::UnsupportedSpec` if the model type cannot serve the
    /// spec (e.g. an adversarial spec for the linear model).
    pub fn create(model_type: ModelType, model_id: String, spec: &ModelSpec) -> Result<Box<dyn Model>, ModelError> {
        debug!(
            model_type = %model_type,
            model_id = %model_id,
            adversarial = spec.is_adversarial(),
            "Creating model instance"
        );

        match model_type {
            ModelType::Mock => Ok(Box::new(MockModel::new(model_id, spec.clone()))),
            ModelType::Linear => Ok(Box::new(LinearSoftmaxModel::new(model_id, spec.clone())?)),
        }
    }

    /// Creates a model from a model type string.
    ///
    /// # Errors
    /// Returns a `ModelError` if the model type is unrecognized or creation fails.
    pub fn create_from_str(
        model_type_str: &str,
        model_id: String,
        spec: &ModelSpec,
    ) -> Result<Box<dyn Model>, ModelError> {
        let model_type = ModelType::from_str(model_type_str).map_err(|()| {
            error!(model_type = %model_type_str, "Unrecognized model type");
            ModelError::UnsupportedSpec(format!("Unrecognized model type: {}", model_type_str))
        })?;
        Self::create(model_type, model_id, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(num_domains: Option<usize>) -> ModelSpec {
        ModelSpec { input_frames: 8, input_bands: 4, num_classes: 3, num_domains }
    }

    #[test]
    fn test_model_type_from_str() {
        assert_eq!(ModelType::from_str("mock"), Ok(ModelType::Mock));
        assert_eq!(ModelType::from_str("MOCK"), Ok(ModelType::Mock));
        assert_eq!(ModelType::from_str("linear"), Ok(ModelType::Linear));
        assert_eq!(ModelType::from_str("Linear_Softmax"), Ok(ModelType::Linear));
        assert_eq!(ModelType::from_str("unknown"), Err(()));
    }

    #[test]
    fn test_model_type_display_round_trips() {
        for t in [ModelType::Mock, ModelType::Linear] {
            assert_eq!(ModelType::from_str(&t.to_string()), Ok(t));
        }
    }

    #[test]
    fn test_factory_create_mock() {
        let model = ModelFactory::create(ModelType::Mock, "test-mock".to_string(), &spec(Some(2))).unwrap();
        assert_eq!(model.model_id(), "test-mock");
    }

    #[test]
    fn test_factory_create_from_str() {
        let model = ModelFactory::create_from_str("linear", "lin".to_string(), &spec(None)).unwrap();
        assert_eq!(model.model_id(), "lin");
    }

    #[test]
    fn test_factory_rejects_adversarial_linear() {
        let result = ModelFactory::create(ModelType::Linear, "lin".to_string(), &spec(Some(2)));
        assert!(matches!(result, Err(ModelError::UnsupportedSpec(_))));
    }

    #[test]
    fn test_factory_create_invalid_type() {
        assert!(ModelFactory::create_from_str("invalid", "x".to_string(), &spec(None)).is_err());
    }
}
