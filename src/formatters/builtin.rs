//! The closed set of value transforms a mapping rule may apply.

use serde_json::{Map, Number, Value};
use tracing::debug;

use super::registry::FormatterKind;

/// Names of the transforms compiled into this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatterId {
    ToInt,
    ToFloat,
    ToString,
    ToBool,
    Trim,
    Lowercase,
    Uppercase,
    First,
    Count,
    JsonEncode,
    PickLang,
    Multiply,
    Round,
    Clamp,
    Default,
    Truncate,
    MapValue,
}

impl FormatterId {
    pub const ALL: &'static [FormatterId] = &[
        FormatterId::ToInt,
        FormatterId::ToFloat,
        FormatterId::ToString,
        FormatterId::ToBool,
        FormatterId::Trim,
        FormatterId::Lowercase,
        FormatterId::Uppercase,
        FormatterId::First,
        FormatterId::Count,
        FormatterId::JsonEncode,
        FormatterId::PickLang,
        FormatterId::Multiply,
        FormatterId::Round,
        FormatterId::Clamp,
        FormatterId::Default,
        FormatterId::Truncate,
        FormatterId::MapValue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FormatterId::ToInt => "to_int",
            FormatterId::ToFloat => "to_float",
            FormatterId::ToString => "to_string",
            FormatterId::ToBool => "to_bool",
            FormatterId::Trim => "trim",
            FormatterId::Lowercase => "lowercase",
            FormatterId::Uppercase => "uppercase",
            FormatterId::First => "first",
            FormatterId::Count => "count",
            FormatterId::JsonEncode => "json_encode",
            FormatterId::PickLang => "pick_lang",
            FormatterId::Multiply => "multiply",
            FormatterId::Round => "round",
            FormatterId::Clamp => "clamp",
            FormatterId::Default => "default",
            FormatterId::Truncate => "truncate",
            FormatterId::MapValue => "map_value",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    pub fn kind(self) -> FormatterKind {
        match self {
            FormatterId::PickLang
            | FormatterId::Multiply
            | FormatterId::Round
            | FormatterId::Clamp
            | FormatterId::Default
            | FormatterId::Truncate
            | FormatterId::MapValue => FormatterKind::Parameterized,
            _ => FormatterKind::Pure,
        }
    }
}

/// A transform with its arguments already checked and typed
#[derive(Debug, Clone, PartialEq)]
pub enum Formatter {
    ToInt,
    ToFloat,
    ToString,
    ToBool,
    Trim,
    Lowercase,
    Uppercase,
    First,
    Count,
    JsonEncode,
    /// Pick one language out of a `{"fr": .., "en": ..}` object
    PickLang { lang: Option<String> },
    Multiply { factor: f64 },
    Round { precision: u32 },
    Clamp { min: Option<f64>, max: Option<f64> },
    Default { value: Value },
    Truncate { max_length: usize },
    MapValue {
        map: Map<String, Value>,
        default: Option<Value>,
    },
}

/// Values a formatter may read besides its input
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    pub default_language: &'a str,
}

impl Formatter {
    /// Build the typed transform from arguments that passed the registry's schema check.
    pub fn from_args(id: FormatterId, args: &Map<String, Value>) -> Result<Self, String> {
        let number = |key: &str| args.get(key).and_then(Value::as_f64);
        let required_number =
            |key: &str| number(key).ok_or_else(|| format!("argument '{}' must be a number", key));

        let formatter = match id {
            FormatterId::ToInt => Formatter::ToInt,
            FormatterId::ToFloat => Formatter::ToFloat,
            FormatterId::ToString => Formatter::ToString,
            FormatterId::ToBool => Formatter::ToBool,
            FormatterId::Trim => Formatter::Trim,
            FormatterId::Lowercase => Formatter::Lowercase,
            FormatterId::Uppercase => Formatter::Uppercase,
            FormatterId::First => Formatter::First,
            FormatterId::Count => Formatter::Count,
            FormatterId::JsonEncode => Formatter::JsonEncode,
            FormatterId::PickLang => Formatter::PickLang {
                lang: args.get("lang").and_then(Value::as_str).map(str::to_string),
            },
            FormatterId::Multiply => Formatter::Multiply {
                factor: required_number("factor")?,
            },
            FormatterId::Round => {
                let precision = args.get("precision").and_then(Value::as_u64).unwrap_or(0);
                if precision > 10 {
                    return Err("argument 'precision' must be between 0 and 10".to_string());
                }
                Formatter::Round {
                    precision: precision as u32,
                }
            }
            FormatterId::Clamp => {
                let (min, max) = (number("min"), number("max"));
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(format!("clamp min {} is greater than max {}", lo, hi));
                    }
                }
                Formatter::Clamp { min, max }
            }
            FormatterId::Default => Formatter::Default {
                value: args
                    .get("value")
                    .cloned()
                    .ok_or("argument 'value' is required")?,
            },
            FormatterId::Truncate => Formatter::Truncate {
                max_length: args
                    .get("max_length")
                    .and_then(Value::as_u64)
                    .ok_or("argument 'max_length' must be a non-negative integer")?
                    as usize,
            },
            FormatterId::MapValue => Formatter::MapValue {
                map: args
                    .get("map")
                    .and_then(Value::as_object)
                    .cloned()
                    .ok_or("argument 'map' must be an object")?,
                default: args.get("default").cloned(),
            },
        };
        Ok(formatter)
    }

    /// Apply the transform. Input of the wrong shape becomes `null`.
    pub fn apply(&self, value: Value, ctx: &FormatContext) -> Value {
        if value.is_null() {
            return match self {
                Formatter::Default { value } => value.clone(),
                Formatter::MapValue { map, default } => map
                    .get("null")
                    .or(default.as_ref())
                    .cloned()
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }

        let result = match self {
            Formatter::ToInt => to_int(&value),
            Formatter::ToFloat => to_float(&value).and_then(float_value),
            Formatter::ToString => match &value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                other => Some(Value::String(other.to_string())),
            },
            Formatter::ToBool => to_bool(&value).map(Value::Bool),
            Formatter::Trim => map_str(&value, |s| s.trim().to_string()),
            Formatter::Lowercase => map_str(&value, str::to_lowercase),
            Formatter::Uppercase => map_str(&value, str::to_uppercase),
            Formatter::First => value.as_array().map(|a| a.first().cloned().unwrap_or(Value::Null)),
            Formatter::Count => match &value {
                Value::Array(a) => Some(Value::from(a.len())),
                Value::Object(o) => Some(Value::from(o.len())),
                _ => None,
            },
            Formatter::JsonEncode => Some(Value::String(value.to_string())),
            Formatter::PickLang { lang } => match &value {
                Value::Object(translations) => {
                    let wanted = lang.as_deref().unwrap_or(ctx.default_language);
                    Some(
                        translations
                            .get(wanted)
                            .or_else(|| translations.get(ctx.default_language))
                            .cloned()
                            .unwrap_or(Value::Null),
                    )
                }
                Value::String(_) => Some(value.clone()),
                _ => None,
            },
            Formatter::Multiply { factor } => {
                to_float(&value).and_then(|n| float_value(n * factor))
            }
            Formatter::Round { precision } => to_float(&value).and_then(|n| {
                if *precision == 0 {
                    Some(Value::from(n.round() as i64))
                } else {
                    let scale = 10f64.powi(*precision as i32);
                    float_value((n * scale).round() / scale)
                }
            }),
            Formatter::Clamp { min, max } => to_float(&value).map(|n| {
                let mut clamped = n;
                if let Some(lo) = min {
                    clamped = clamped.max(*lo);
                }
                if let Some(hi) = max {
                    clamped = clamped.min(*hi);
                }
                if clamped == n {
                    value.clone()
                } else {
                    float_value(clamped).unwrap_or(Value::Null)
                }
            }),
            Formatter::Default { .. } => Some(value.clone()),
            Formatter::Truncate { max_length } => {
                map_str(&value, |s| s.chars().take(*max_length).collect())
            }
            Formatter::MapValue { map, default } => {
                let key = match &value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => String::new(),
                };
                Some(
                    map.get(&key)
                        .or(default.as_ref())
                        .cloned()
                        .unwrap_or(Value::Null),
                )
            }
        };

        result.unwrap_or_else(|| {
            debug!(formatter = ?self, input = %value, "formatter input has the wrong shape");
            Value::Null
        })
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Option<Value> {
    value.as_str().map(|s| Value::String(f(s)))
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_int(value: &Value) -> Option<Value> {
    if let Some(i) = value.as_i64() {
        return Some(Value::from(i));
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(Value::from(i));
        }
    }
    to_float(value)
        .filter(|n| n.abs() < i64::MAX as f64)
        .map(|n| Value::from(n.trunc() as i64))
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn float_value(n: f64) -> Option<Value> {
    Number::from_f64(n).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CTX: FormatContext<'static> = FormatContext {
        default_language: "fr",
    };

    fn build(id: FormatterId, args: Value) -> Formatter {
        let args = args.as_object().cloned().unwrap_or_default();
        Formatter::from_args(id, &args).unwrap()
    }

    #[test]
    fn test_names_are_unique_and_resolvable() {
        for id in FormatterId::ALL {
            assert_eq!(FormatterId::from_name(id.name()), Some(*id));
        }
        assert_eq!(FormatterId::from_name("eval"), None);
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Formatter::ToInt.apply(json!("42"), &CTX), json!(42));
        assert_eq!(Formatter::ToInt.apply(json!(7.9), &CTX), json!(7));
        assert_eq!(Formatter::ToInt.apply(json!("abc"), &CTX), Value::Null);
        assert_eq!(Formatter::ToFloat.apply(json!("2.5"), &CTX), json!(2.5));
        assert_eq!(Formatter::ToString.apply(json!(12), &CTX), json!("12"));
        assert_eq!(Formatter::ToBool.apply(json!("yes"), &CTX), json!(true));
        assert_eq!(Formatter::ToBool.apply(json!(0), &CTX), json!(false));
        assert_eq!(Formatter::Trim.apply(json!("  Bouftou "), &CTX), json!("Bouftou"));
        assert_eq!(Formatter::Uppercase.apply(json!(3), &CTX), Value::Null);
    }

    #[test]
    fn test_collections() {
        assert_eq!(Formatter::First.apply(json!([3, 4]), &CTX), json!(3));
        assert_eq!(Formatter::First.apply(json!([]), &CTX), Value::Null);
        assert_eq!(Formatter::Count.apply(json!([1, 2, 3]), &CTX), json!(3));
        assert_eq!(
            Formatter::JsonEncode.apply(json!({"a": 1}), &CTX),
            json!(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_pick_lang() {
        let names = json!({"fr": "Bouftou", "en": "Gobball"});
        let default_lang = build(FormatterId::PickLang, json!({}));
        assert_eq!(default_lang.apply(names.clone(), &CTX), json!("Bouftou"));

        let english = build(FormatterId::PickLang, json!({"lang": "en"}));
        assert_eq!(english.apply(names.clone(), &CTX), json!("Gobball"));

        let missing = build(FormatterId::PickLang, json!({"lang": "de"}));
        assert_eq!(missing.apply(names, &CTX), json!("Bouftou"));
    }

    #[test]
    fn test_parameterized_numbers() {
        let multiply = build(FormatterId::Multiply, json!({"factor": 0.5}));
        assert_eq!(multiply.apply(json!(10), &CTX), json!(5.0));

        let round = build(FormatterId::Round, json!({}));
        assert_eq!(round.apply(json!(2.6), &CTX), json!(3));
        let round2 = build(FormatterId::Round, json!({"precision": 2}));
        assert_eq!(round2.apply(json!(1.23456), &CTX), json!(1.23));

        let clamp = build(FormatterId::Clamp, json!({"min": 0, "max": 100}));
        assert_eq!(clamp.apply(json!(150), &CTX), json!(100.0));
        assert_eq!(clamp.apply(json!(50), &CTX), json!(50));

        let bad = Formatter::from_args(
            FormatterId::Clamp,
            json!({"min": 5, "max": 1}).as_object().unwrap(),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_default_truncate_and_map() {
        let default = build(FormatterId::Default, json!({"value": 1}));
        assert_eq!(default.apply(Value::Null, &CTX), json!(1));
        assert_eq!(default.apply(json!(4), &CTX), json!(4));

        let truncate = build(FormatterId::Truncate, json!({"max_length": 3}));
        assert_eq!(truncate.apply(json!("Éternel"), &CTX), json!("Éte"));

        let sizes = build(
            FormatterId::MapValue,
            json!({"map": {"1": "small", "2": "large"}, "default": "medium"}),
        );
        assert_eq!(sizes.apply(json!(2), &CTX), json!("large"));
        assert_eq!(sizes.apply(json!(9), &CTX), json!("medium"));
    }
}
