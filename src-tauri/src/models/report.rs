// Report records as served by /report
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One flat metrics object per run; keys vary by flow version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportRecord(Map<String, Value>);

impl ReportRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Text form of a scalar value; `null` counts as absent
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Value> for ReportRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text() {
        let record = ReportRecord::from(json!({
            "wns": -0.2,
            "cell_count": 5000,
            "design": "spm",
            "HPWL": null,
            "flag": true
        }));
        assert_eq!(record.text("wns").as_deref(), Some("-0.2"));
        assert_eq!(record.text("cell_count").as_deref(), Some("5000"));
        assert_eq!(record.text("design").as_deref(), Some("spm"));
        assert_eq!(record.text("HPWL"), None);
        assert_eq!(record.text("missing"), None);
        assert_eq!(record.text("flag").as_deref(), Some("true"));
        assert_eq!(record.len(), 5);
    }
}
