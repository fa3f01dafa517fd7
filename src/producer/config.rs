//! Producer configuration values.
//!
//! Each producer type defines its own configuration struct. The registry and
//! driver only see it as `Box<dyn ProducerConfig>`: they can decode external
//! settings into the right shape, clone it, and validate it when the type
//! opts into [`Validate`]. Implementations are generated with
//! [`producer_config!`](crate::producer_config).

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Opt-in validation capability for configuration types.
///
/// A configuration without it is accepted as-is.
pub trait Validate {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Type-erased configuration value.
pub trait ProducerConfig: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn clone_config(&self) -> Box<dyn ProducerConfig>;

    /// Decode raw settings into a new value of this configuration's type.
    fn decode(&self, settings: Value) -> Result<Box<dyn ProducerConfig>, ConfigError>;

    /// Settings form of this value, suitable for display or re-decoding.
    fn to_settings(&self) -> Value;

    fn type_name(&self) -> &'static str;

    /// The validation capability, when this type has one.
    fn validator(&self) -> Option<&dyn Validate> {
        None
    }
}

impl Clone for Box<dyn ProducerConfig> {
    fn clone(&self) -> Self {
        self.clone_config()
    }
}

/// Implements [`ProducerConfig`] for a `Serialize + DeserializeOwned + Clone`
/// struct. Add `validated` when the type also implements
/// [`Validate`](crate::producer::Validate).
///
/// ```ignore
/// producer_config!(FeedConfig, validated);
/// producer_config!(EmptyConfig);
/// ```
#[macro_export]
macro_rules! producer_config {
    (@common $ty:ty) => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn clone_config(&self) -> Box<dyn $crate::producer::ProducerConfig> {
            Box::new(self.clone())
        }

        fn decode(
            &self,
            settings: ::serde_json::Value,
        ) -> Result<Box<dyn $crate::producer::ProducerConfig>, $crate::error::ConfigError> {
            let decoded: $ty = $crate::producer::config::decode_settings(settings)?;
            Ok(Box::new(decoded))
        }

        fn to_settings(&self) -> ::serde_json::Value {
            ::serde_json::to_value(self).unwrap_or_default()
        }

        fn type_name(&self) -> &'static str {
            ::std::any::type_name::<$ty>()
        }
    };
    ($ty:ty) => {
        impl $crate::producer::ProducerConfig for $ty {
            $crate::producer_config!(@common $ty);
        }
    };
    ($ty:ty, validated) => {
        impl $crate::producer::ProducerConfig for $ty {
            $crate::producer_config!(@common $ty);

            fn validator(&self) -> Option<&dyn $crate::producer::Validate> {
                Some(self)
            }
        }
    };
}

/// Deserialize settings into `T`. A null value decodes like an empty table,
/// so configurations with defaults accept "no settings".
pub fn decode_settings<T: DeserializeOwned>(settings: Value) -> Result<T, ConfigError> {
    let settings = match settings {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    Ok(serde_json::from_value(settings)?)
}

/// Recover the concrete configuration type, rejecting any other shape.
pub fn downcast_config<C>(config: &dyn ProducerConfig) -> Result<C, ConfigError>
where
    C: ProducerConfig + Clone,
{
    config
        .as_any()
        .downcast_ref::<C>()
        .cloned()
        .ok_or(ConfigError::WrongShape {
            expected: type_name::<C>(),
            actual: config.type_name(),
        })
}

/// Run the value's validation capability, if it has one.
pub fn validate_config(config: &dyn ProducerConfig) -> Result<(), ConfigError> {
    match config.validator() {
        Some(validator) => validator.validate().map_err(ConfigError::Invalid),
        None => Ok(()),
    }
}

/// Configuration for producers that take none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyConfig {}

crate::producer_config!(EmptyConfig);

/// Holder for a producer's live configuration.
///
/// Readers get an `Arc` snapshot; [`ConfigSlot::replace`] checks shape and
/// validity first and then swaps the whole value, so a rejected config never
/// leaves a partial update behind.
#[derive(Debug)]
pub struct ConfigSlot<C> {
    current: RwLock<Arc<C>>,
}

impl<C: ProducerConfig + Clone> ConfigSlot<C> {
    pub fn new(config: C) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn load(&self) -> Arc<C> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, config: &dyn ProducerConfig) -> Result<(), ConfigError> {
        let next = downcast_config::<C>(config)?;
        validate_config(&next)?;
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct LimitConfig {
        limit: u32,
    }

    impl Validate for LimitConfig {
        fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(self.limit > 0, "limit must be positive");
            Ok(())
        }
    }

    crate::producer_config!(LimitConfig, validated);

    #[test]
    fn decode_null_uses_defaults() {
        let decoded = LimitConfig::default().decode(Value::Null).unwrap();
        let config = downcast_config::<LimitConfig>(decoded.as_ref()).unwrap();
        assert_eq!(config, LimitConfig::default());
    }

    #[test]
    fn decode_rejects_malformed_settings() {
        let err = LimitConfig::default()
            .decode(json!({"limit": "lots"}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Decode(_)));
    }

    #[test]
    fn downcast_rejects_wrong_shape() {
        let err = downcast_config::<LimitConfig>(&EmptyConfig {}).unwrap_err();
        assert!(matches!(err, ConfigError::WrongShape { .. }));
        assert!(err.to_string().contains("EmptyConfig"));
    }

    #[test]
    fn validation_is_opt_in() {
        assert!(EmptyConfig {}.validator().is_none());
        assert!(validate_config(&EmptyConfig {}).is_ok());
        assert!(matches!(
            validate_config(&LimitConfig { limit: 0 }),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn slot_replace_is_all_or_nothing() {
        let slot = ConfigSlot::new(LimitConfig { limit: 5 });

        assert!(slot.replace(&LimitConfig { limit: 0 }).is_err());
        assert_eq!(slot.load().limit, 5);

        assert!(slot.replace(&EmptyConfig {}).is_err());
        assert_eq!(slot.load().limit, 5);

        slot.replace(&LimitConfig { limit: 9 }).unwrap();
        assert_eq!(slot.load().limit, 9);
    }

    #[test]
    fn settings_round_trip() {
        let settings = LimitConfig { limit: 3 }.to_settings();
        assert_eq!(settings, json!({"limit": 3}));
    }
}
