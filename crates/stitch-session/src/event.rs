//! 離散イベント（`type` フィールドを持つ JSON オブジェクト）

use serde_json::{Map, Value as JsonValue};

use crate::error::SessionError;

/// アプリケーション定義の離散イベント
///
/// ```json
/// {"type": "tap", "x": 10}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AppEvent {
    fields: Map<String, JsonValue>,
}

impl AppEvent {
    /// `type` だけを持つイベントを作る
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), JsonValue::String(event_type.into()));
        AppEvent { fields }
    }

    /// フィールドを追加する
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// JSON 文字列を解釈する
    ///
    /// # エラー
    /// JSON として読めない、オブジェクトでない、文字列の `type` がない → `InvalidEvent`
    pub fn parse(json: &str) -> Result<Self, SessionError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| SessionError::InvalidEvent(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, SessionError> {
        let JsonValue::Object(fields) = value else {
            return Err(SessionError::InvalidEvent("event must be a JSON object".into()));
        };
        if !matches!(fields.get("type"), Some(JsonValue::String(_))) {
            return Err(SessionError::InvalidEvent(
                "event needs a string \"type\" field".into(),
            ));
        }
        Ok(AppEvent { fields })
    }

    pub fn event_type(&self) -> &str {
        self.fields
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    pub fn to_json(&self) -> String {
        JsonValue::Object(self.fields.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let event = AppEvent::parse(r#"{"type":"tap","x":10}"#).unwrap();
        assert_eq!(event.event_type(), "tap");
        assert_eq!(event.get("x"), Some(&JsonValue::from(10)));
    }

    #[test]
    fn test_rejects_non_events() {
        for json in [r#"{"x":1}"#, r#"{"type":3}"#, "[1,2]", "{not json"] {
            assert!(
                matches!(AppEvent::parse(json), Err(SessionError::InvalidEvent(_))),
                "{json}"
            );
        }
    }

    #[test]
    fn test_builder_serializes() {
        let event = AppEvent::new("tap").with("x", 10);
        let reparsed = AppEvent::parse(&event.to_json()).unwrap();
        assert_eq!(reparsed, event);
    }
}
