use serde_json::{Map, Number, Value};

/// Key naming the reference variable of a table formula.
pub const REFERENCE_KEY: &str = "characteristic";

/// A decoded formula field.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpression {
    /// Arithmetic text with `[variable]` placeholders.
    Expression(String),
    /// Piecewise lookup keyed on one variable.
    Table(FormulaTable),
}

/// Value of one table band.
#[derive(Debug, Clone, PartialEq)]
pub enum TableValue {
    Number(f64),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    /// Any finite number; `"2.5"` is as valid a key as `"3"`
    pub threshold_from: f64,
    pub value: TableValue,
}

/// Piecewise table whose entries are always sorted by `threshold_from`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaTable {
    reference_variable: String,
    entries: Vec<TableEntry>,
    /// Keys that were neither the reference key nor finite numbers.
    ignored_keys: Vec<String>,
}

impl FormulaTable {
    pub fn new(reference_variable: impl Into<String>, mut entries: Vec<TableEntry>) -> Self {
        entries.sort_by(|a, b| a.threshold_from.total_cmp(&b.threshold_from));
        Self {
            reference_variable: reference_variable.into(),
            entries,
            ignored_keys: Vec::new(),
        }
    }

    pub fn reference_variable(&self) -> &str {
        &self.reference_variable
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn ignored_keys(&self) -> &[String] {
        &self.ignored_keys
    }

    /// The band for `value`: the greatest threshold not above it, else the first.
    pub fn select(&self, value: f64) -> Option<&TableEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.threshold_from <= value)
            .or_else(|| self.entries.first())
    }

    /// Serialize back into the JSON object form `decode` reads.
    pub fn encode(&self) -> String {
        let mut map = Map::new();
        map.insert(
            REFERENCE_KEY.to_string(),
            Value::String(self.reference_variable.clone()),
        );
        for entry in &self.entries {
            let value = match &entry.value {
                TableValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
                TableValue::Expression(text) => Value::String(text.clone()),
            };
            map.insert(entry.threshold_from.to_string(), value);
        }
        Value::Object(map).to_string()
    }

    fn from_object(reference: &str, object: &Map<String, Value>) -> Self {
        let mut entries = Vec::new();
        let mut ignored_keys = Vec::new();

        for (key, value) in object {
            if key == REFERENCE_KEY {
                continue;
            }
            let threshold = match key.trim().parse::<f64>() {
                Ok(t) if t.is_finite() => t,
                _ => {
                    ignored_keys.push(key.clone());
                    continue;
                }
            };
            let value = match value {
                Value::Number(n) => match n.as_f64() {
                    Some(f) => TableValue::Number(f),
                    None => {
                        ignored_keys.push(key.clone());
                        continue;
                    }
                },
                Value::String(s) => TableValue::Expression(s.clone()),
                _ => {
                    ignored_keys.push(key.clone());
                    continue;
                }
            };
            entries.push(TableEntry {
                threshold_from: threshold,
                value,
            });
        }

        let mut table = Self::new(reference, entries);
        table.ignored_keys = ignored_keys;
        table
    }
}

impl FormulaExpression {
    /// Decode a stored formula field. Empty text is an absent formula.
    pub fn decode(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with('{') {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
                if let Some(Value::String(reference)) = object.get(REFERENCE_KEY) {
                    return Some(Self::Table(FormulaTable::from_object(reference, &object)));
                }
            }
        }

        Some(Self::Expression(trimmed.to_string()))
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Expression(text) => text.clone(),
            Self::Table(table) => table.encode(),
        }
    }
}
