use crate::config::{ConfigError, EngineConfig};
use crate::models::{Interaction, InteractionKind};
use std::collections::HashMap;

/// Accumulated interaction strength per product for one user.
pub type WeightVector = HashMap<String, f64>;

/// Interaction type → signal strength lookup.
///
/// Total: any type missing from the table gets the `unknown` weight.
#[derive(Debug, Clone)]
pub struct InteractionWeights {
    table: HashMap<String, f64>,
    unknown: f64,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        let mut table = HashMap::new();
        table.insert("purchase".to_string(), 5.0);
        table.insert("like".to_string(), 3.0);
        table.insert("view".to_string(), 1.0);
        Self {
            table,
            unknown: 1.0,
        }
    }
}

impl InteractionWeights {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut table = HashMap::new();
        table.insert("purchase".to_string(), config.weight_purchase);
        table.insert("like".to_string(), config.weight_like);
        table.insert("view".to_string(), config.weight_view);
        for (name, weight) in config.parsed_extra_weights()? {
            table.insert(name, weight);
        }

        Ok(Self {
            table,
            unknown: config.weight_unknown,
        })
    }

    pub fn weight(&self, kind: &InteractionKind) -> f64 {
        self.table.get(kind.as_str()).copied().unwrap_or(self.unknown)
    }

    /// Sum interaction weights per product; repeated interactions accumulate.
    pub fn vector(&self, interactions: &[Interaction]) -> WeightVector {
        let mut vector = WeightVector::new();
        for interaction in interactions {
            *vector.entry(interaction.product_id.clone()).or_insert(0.0) +=
                self.weight(&interaction.kind);
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let weights = InteractionWeights::default();
        assert_eq!(weights.weight(&InteractionKind::Purchase), 5.0);
        assert_eq!(weights.weight(&InteractionKind::Like), 3.0);
        assert_eq!(weights.weight(&InteractionKind::View), 1.0);
        assert_eq!(weights.weight(&InteractionKind::from("share")), 1.0);
    }

    #[test]
    fn test_extra_weights_from_config() {
        let config = EngineConfig {
            extra_weights: "share=4".to_string(),
            weight_unknown: 0.5,
            ..EngineConfig::default()
        };
        let weights = InteractionWeights::from_config(&config).unwrap();
        assert_eq!(weights.weight(&InteractionKind::from("share")), 4.0);
        assert_eq!(weights.weight(&InteractionKind::from("wishlist")), 0.5);
    }

    #[test]
    fn test_vector_accumulates_repeated_interactions() {
        let weights = InteractionWeights::default();
        let vector = weights.vector(&[
            Interaction::new("u1", "p1", "view"),
            Interaction::new("u1", "p1", "view"),
            Interaction::new("u1", "p1", "purchase"),
            Interaction::new("u1", "p2", "like"),
        ]);

        assert_eq!(vector.get("p1"), Some(&7.0));
        assert_eq!(vector.get("p2"), Some(&3.0));
    }
}
