//! Collection naming strategies.

use vectorize_types::{CollectionStrategyKind, ModelError, Settings};

/// Maps partitions to concrete collection names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStrategy {
    /// Every partition lands in one named collection
    Single { name: String },
    /// Each partition gets its own collection, optionally prefixed
    PerPartition { prefix: Option<String> },
}

impl CollectionStrategy {
    /// Build the strategy described by the settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        match settings.collection_strategy {
            CollectionStrategyKind::Single => {
                let name = settings.collection.clone().ok_or_else(|| {
                    ModelError::Config(
                        "single collection strategy requires a collection name".to_string(),
                    )
                })?;
                Ok(CollectionStrategy::Single { name })
            }
            CollectionStrategyKind::PerPartition => Ok(CollectionStrategy::PerPartition {
                prefix: settings.collection.clone(),
            }),
        }
    }

    /// Concrete collection name for one partition.
    pub fn collection_for(&self, partition_name: &str) -> String {
        match self {
            CollectionStrategy::Single { name } => name.clone(),
            CollectionStrategy::PerPartition { prefix } => match prefix {
                Some(prefix) => format!("{prefix}_{partition_name}"),
                None => partition_name.to_string(),
            },
        }
    }

    /// Whether stale data is removed by dropping whole collections.
    pub fn drops_whole_collections(&self) -> bool {
        matches!(self, CollectionStrategy::PerPartition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_strategy() {
        let strategy = CollectionStrategy::Single {
            name: "corpus".to_string(),
        };
        assert_eq!(strategy.collection_for("partition_00001"), "corpus");
        assert_eq!(strategy.collection_for("partition_00002"), "corpus");
        assert!(!strategy.drops_whole_collections());
    }

    #[test]
    fn test_per_partition_strategy() {
        let prefixed = CollectionStrategy::PerPartition {
            prefix: Some("corpus".to_string()),
        };
        assert_eq!(
            prefixed.collection_for("partition_00037"),
            "corpus_partition_00037"
        );

        let bare = CollectionStrategy::PerPartition { prefix: None };
        assert_eq!(bare.collection_for("partition_00037"), "partition_00037");
        assert!(bare.drops_whole_collections());
    }

    #[test]
    fn test_from_settings_requires_name_for_single() {
        let settings = Settings::default();
        assert!(CollectionStrategy::from_settings(&settings).is_err());

        let settings = Settings {
            collection: Some("corpus".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            CollectionStrategy::from_settings(&settings).unwrap(),
            CollectionStrategy::Single {
                name: "corpus".to_string()
            }
        );
    }
}
