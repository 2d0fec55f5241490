//! In-memory parameter registry
//!
//! A fixed-capacity table of typed, range-checked parameters implementing
//! [`ParameterStore`]. Autopilots with their own persistent storage implement
//! the trait directly instead.

use mavlink::common::MavParamType;

use super::{ParamName, ParameterStore, StoredParam};
use crate::error::ParamStoreError;

/// Maximum number of registered parameters
pub const MAX_PARAMS: usize = 200;

/// Parameter type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// 32-bit floating point parameter
    Float,
    /// 32-bit unsigned integer parameter
    Uint32,
}

/// Parameter value (union of supported types)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Uint32(u32),
}

impl ParamValue {
    /// Value as carried in PARAM_VALUE / PARAM_SET
    pub fn as_f32(self) -> f32 {
        match self {
            ParamValue::Float(f) => f,
            ParamValue::Uint32(u) => u as f32,
        }
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::Uint32(_) => ParamType::Uint32,
        }
    }

    /// MAVLink type tag for this value
    pub fn mav_param_type(&self) -> MavParamType {
        match self {
            ParamValue::Float(_) => MavParamType::MAV_PARAM_TYPE_REAL32,
            ParamValue::Uint32(_) => MavParamType::MAV_PARAM_TYPE_UINT32,
        }
    }

    /// Convert a MAVLink float carrier to `param_type`.
    ///
    /// Integer parameters reject negative, fractional and non-finite values.
    pub fn from_f32(value: f32, param_type: ParamType) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        match param_type {
            ParamType::Float => Some(ParamValue::Float(value)),
            ParamType::Uint32 => {
                if value < 0.0 || value > u32::MAX as f32 || value.fract() != 0.0 {
                    None
                } else {
                    Some(ParamValue::Uint32(value as u32))
                }
            }
        }
    }
}

/// Parameter metadata (definition and current value)
#[derive(Debug, Clone)]
pub struct ParamMetadata {
    /// Parameter name (max 16 characters, MAVLink standard)
    pub name: &'static str,
    pub param_type: ParamType,
    pub value: ParamValue,
    pub min: ParamValue,
    pub max: ParamValue,
    /// Rejects writes from a GCS
    pub read_only: bool,
}

impl ParamMetadata {
    pub const fn new_float(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            param_type: ParamType::Float,
            value: ParamValue::Float(default),
            min: ParamValue::Float(min),
            max: ParamValue::Float(max),
            read_only: false,
        }
    }

    pub const fn new_uint32(name: &'static str, default: u32, min: u32, max: u32) -> Self {
        Self {
            name,
            param_type: ParamType::Uint32,
            value: ParamValue::Uint32(default),
            min: ParamValue::Uint32(min),
            max: ParamValue::Uint32(max),
            read_only: false,
        }
    }

    /// Mark the parameter as not writable over MAVLink
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Validate value is within bounds
    pub fn is_valid(&self, value: ParamValue) -> bool {
        match (value, self.min, self.max) {
            (ParamValue::Float(v), ParamValue::Float(min), ParamValue::Float(max)) => {
                v >= min && v <= max
            }
            (ParamValue::Uint32(v), ParamValue::Uint32(min), ParamValue::Uint32(max)) => {
                v >= min && v <= max
            }
            _ => false,
        }
    }
}

/// Fixed-capacity parameter table
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    params: heapless::Vec<ParamMetadata, MAX_PARAMS>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter
    ///
    /// Names longer than the 16-byte MAVLink id are rejected.
    pub fn register(&mut self, param: ParamMetadata) -> Result<(), ParamStoreError> {
        if param.name.len() > super::PARAM_NAME_LEN || !param.is_valid(param.value) {
            return Err(ParamStoreError::InvalidValue);
        }
        self.params
            .push(param)
            .map_err(|_| ParamStoreError::RegistryFull)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ParamMetadata> {
        self.params.iter().find(|p| p.name == name)
    }

    fn stored(&self, index: usize) -> Option<StoredParam> {
        let param = self.params.get(index)?;
        Some(StoredParam {
            index: index as u16,
            name: ParamName::try_from(param.name).ok()?,
            value: param.value,
        })
    }
}

impl ParameterStore for ParameterRegistry {
    fn count(&self) -> u16 {
        self.params.len() as u16
    }

    fn get_by_index(&self, index: u16) -> Option<StoredParam> {
        self.stored(usize::from(index))
    }

    fn find(&self, name: &str) -> Option<StoredParam> {
        let index = self.params.iter().position(|p| p.name == name)?;
        self.stored(index)
    }

    fn set(&mut self, name: &str, value: f32) -> Result<StoredParam, ParamStoreError> {
        let index = self
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or(ParamStoreError::NotFound)?;
        let param = &mut self.params[index];
        if param.read_only {
            return Err(ParamStoreError::ReadOnly);
        }

        let value =
            ParamValue::from_f32(value, param.param_type).ok_or(ParamStoreError::InvalidValue)?;
        if !param.is_valid(value) {
            return Err(ParamStoreError::InvalidValue);
        }
        param.value = value;

        self.stored(index).ok_or(ParamStoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry
            .register(ParamMetadata::new_uint32("SR0_EXTRA1", 10, 0, 50))
            .unwrap();
        registry
            .register(ParamMetadata::new_float("CRUISE_SPEED", 2.0, 0.0, 10.0))
            .unwrap();
        registry
            .register(ParamMetadata::new_uint32("SYSID_THISMAV", 1, 1, 255).read_only())
            .unwrap();
        registry
    }

    #[test]
    fn test_register_rejects_long_names() {
        let mut registry = ParameterRegistry::new();
        let err = registry
            .register(ParamMetadata::new_float("NAME_THAT_IS_TOO_LONG", 0.0, 0.0, 1.0))
            .unwrap_err();
        assert_eq!(err, ParamStoreError::InvalidValue);
    }

    #[test]
    fn test_lookup_by_index_and_name() {
        let registry = registry();
        assert_eq!(registry.count(), 3);

        let param = registry.get_by_index(1).unwrap();
        assert_eq!(param.name.as_str(), "CRUISE_SPEED");
        assert_eq!(param.value, ParamValue::Float(2.0));

        let param = registry.find("SR0_EXTRA1").unwrap();
        assert_eq!(param.index, 0);
        assert!(registry.find("NOPE").is_none());
        assert!(registry.get_by_index(3).is_none());
    }

    #[test]
    fn test_set_validates_range_and_type() {
        let mut registry = registry();
        let param = registry.set("SR0_EXTRA1", 20.0).unwrap();
        assert_eq!(param.value, ParamValue::Uint32(20));

        assert_eq!(
            registry.set("SR0_EXTRA1", 100.0),
            Err(ParamStoreError::InvalidValue)
        );
        assert_eq!(
            registry.set("SR0_EXTRA1", 2.5),
            Err(ParamStoreError::InvalidValue)
        );
        assert_eq!(
            registry.set("CRUISE_SPEED", f32::NAN),
            Err(ParamStoreError::InvalidValue)
        );
        assert_eq!(
            registry.get_by_name("SR0_EXTRA1").unwrap().value,
            ParamValue::Uint32(20)
        );
    }

    #[test]
    fn test_set_read_only_and_missing() {
        let mut registry = registry();
        assert_eq!(
            registry.set("SYSID_THISMAV", 2.0),
            Err(ParamStoreError::ReadOnly)
        );
        assert_eq!(registry.set("MISSING", 1.0), Err(ParamStoreError::NotFound));
    }

    #[test]
    fn test_mav_param_type() {
        assert_eq!(
            ParamValue::Float(1.0).mav_param_type(),
            MavParamType::MAV_PARAM_TYPE_REAL32
        );
        assert_eq!(
            ParamValue::Uint32(1).mav_param_type(),
            MavParamType::MAV_PARAM_TYPE_UINT32
        );
    }
}
