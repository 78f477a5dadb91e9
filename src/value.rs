//! Tagged-variant parameter values and per-plugin parameter schemas.
//!
//! Plugins (effects, generators, transitions) declare an ordered
//! [`ParamSchema`] at registration time; every parameter assignment is
//! validated against it before an instance is built .

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// A single parameter value, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Color(u8, u8, u8),
    Enum(String),
}

impl ParamValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<(u8, u8, u8)> {
        match self {
            ParamValue::Color(r, g, b) => Some((*r, *g, *b)),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            ParamValue::Enum(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int",
            ParamValue::Bool(_) => "bool",
            ParamValue::Color(..) => "color",
            ParamValue::Enum(_) => "select",
        }
    }
}

/// The shape a single parameter must conform to: a type tag plus an
/// optional numeric range or enum value set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub tag: ParamTag,
    pub default: ParamValue,
    /// For float/int parameters: inclusive (min, max).
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    /// For select parameters: the allowed enum values.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamTag {
    Float,
    Int,
    Bool,
    Select,
    Color,
}

/// Ordered parameter declaration for one plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    pub params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Validate a caller-supplied parameter map against this schema,
    /// filling in defaults for anything the caller omitted.
    pub fn validate(
        &self,
        plugin_id: &str,
        supplied: &BTreeMap<String, ParamValue>,
    ) -> Result<BTreeMap<String, ParamValue>, PluginError> {
        let mut resolved = BTreeMap::new();

        for spec in &self.params {
            let value = match supplied.get(&spec.name) {
                Some(v) => self.validate_one(plugin_id, spec, v)?,
                None => spec.default.clone(),
            };
            resolved.insert(spec.name.clone(), value);
        }

        Ok(resolved)
    }

    fn validate_one(
        &self,
        plugin_id: &str,
        spec: &ParamSpec,
        value: &ParamValue,
    ) -> Result<ParamValue, PluginError> {
        let reason_mismatch = || PluginError::ParameterValidation {
            plugin_id: plugin_id.to_string(),
            param: spec.name.clone(),
            reason: format!(
                "expected a {:?} value, got {}",
                spec.tag,
                value.kind_name()
            ),
        };

        match spec.tag {
            ParamTag::Float => {
                let v = value.as_float().ok_or_else(reason_mismatch)?;
                if let Some((lo, hi)) = spec.range {
                    if v < lo || v > hi {
                        return Err(PluginError::ParameterValidation {
                            plugin_id: plugin_id.to_string(),
                            param: spec.name.clone(),
                            reason: format!("{v} out of range [{lo}, {hi}]"),
                        });
                    }
                }
                Ok(ParamValue::Float(v))
            }
            ParamTag::Int => {
                let v = value.as_int().ok_or_else(reason_mismatch)?;
                if let Some((lo, hi)) = spec.range {
                    if (v as f64) < lo || (v as f64) > hi {
                        return Err(PluginError::ParameterValidation {
                            plugin_id: plugin_id.to_string(),
                            param: spec.name.clone(),
                            reason: format!("{v} out of range [{lo}, {hi}]"),
                        });
                    }
                }
                Ok(ParamValue::Int(v))
            }
            ParamTag::Bool => value
                .as_bool()
                .map(ParamValue::Bool)
                .ok_or_else(reason_mismatch),
            ParamTag::Color => {
                let (r, g, b) = value.as_color().ok_or_else(reason_mismatch)?;
                Ok(ParamValue::Color(r, g, b))
            }
            ParamTag::Select => {
                let s = value.as_enum().ok_or_else(reason_mismatch)?;
                if !spec.options.iter().any(|o| o == s) {
                    return Err(PluginError::ParameterValidation {
                        plugin_id: plugin_id.to_string(),
                        param: spec.name.clone(),
                        reason: format!("'{s}' is not one of {:?}", spec.options),
                    });
                }
                Ok(ParamValue::Enum(s.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec {
                name: "amount".into(),
                tag: ParamTag::Float,
                default: ParamValue::Float(0.5),
                range: Some((0.0, 1.0)),
                options: vec![],
            },
            ParamSpec {
                name: "mode".into(),
                tag: ParamTag::Select,
                default: ParamValue::Enum("soft".into()),
                range: None,
                options: vec!["soft".into(), "hard".into()],
            },
        ])
    }

    #[test]
    fn missing_params_fall_back_to_defaults() {
        let resolved = schema().validate("blur", &BTreeMap::new()).unwrap();
        assert_eq!(resolved["amount"], ParamValue::Float(0.5));
        assert_eq!(resolved["mode"], ParamValue::Enum("soft".into()));
    }

    #[test]
    fn out_of_range_float_is_rejected() {
        let mut supplied = BTreeMap::new();
        supplied.insert("amount".to_string(), ParamValue::Float(4.0));
        let err = schema().validate("blur", &supplied).unwrap_err();
        assert!(matches!(err, PluginError::ParameterValidation { .. }));
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let mut supplied = BTreeMap::new();
        supplied.insert("mode".to_string(), ParamValue::Enum("extreme".into()));
        let err = schema().validate("blur", &supplied).unwrap_err();
        assert!(matches!(err, PluginError::ParameterValidation { .. }));
    }
}
