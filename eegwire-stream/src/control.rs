use serde_json::{Map, Value};

/// A reassembled control reply.
///
/// Replies are JSON objects with short keys (`hn` device name, `sn` serial,
/// `bp` battery percent, `rc` return code, ...). Anything that does not
/// parse as an object is kept as raw text only.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    pub raw: String,
    pub fields: Map<String, Value>,
}

impl ControlResponse {
    pub fn parse(raw: String) -> Self {
        let fields = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        Self { raw, fields }
    }

    pub fn is_structured(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn return_code(&self) -> Option<i64> {
        self.fields.get("rc").and_then(Value::as_i64)
    }

    pub fn device_name(&self) -> Option<&str> {
        self.fields.get("hn").and_then(Value::as_str)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.fields.get("sn").and_then(Value::as_str)
    }

    pub fn battery_percent(&self) -> Option<f64> {
        self.fields.get("bp").and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_reply() {
        let response = ControlResponse::parse(
            r#"{"hn":"Muse-7A2C","sn":"2031-CNTT-7A2C","bp":83,"rc":0}"#.to_string(),
        );

        assert!(response.is_structured());
        assert_eq!(response.device_name(), Some("Muse-7A2C"));
        assert_eq!(response.serial_number(), Some("2031-CNTT-7A2C"));
        assert_eq!(response.battery_percent(), Some(83.0));
        assert_eq!(response.return_code(), Some(0));
    }

    #[test]
    fn keeps_unparsable_text() {
        let response = ControlResponse::parse("v1.2{broken}".to_string());

        assert!(!response.is_structured());
        assert_eq!(response.raw, "v1.2{broken}");
        assert_eq!(response.return_code(), None);
    }
}
