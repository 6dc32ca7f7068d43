//! JS ⇄ Rust の値変換
//!
//! JS との受け渡しは JSON 文字列で行う（`js_sys::JSON` で相互変換）。
//! ここは js-sys に触れないので native テストで検証できる。

use serde_json::{json, Map, Value as JsonValue};
use stitch_codec::{EdgeMarker, SampleEvent, Value};
use stitch_session::SessionError;

/// `sendEventStream` の `data` 引数（JSON オブジェクト）をプロパティ列にする
///
/// 数値は `Number`、文字列と真偽値は `Text` になる。
///
/// # エラー
/// - JSON オブジェクトでない
/// - 値が `null` / 配列 / オブジェクト
pub fn stream_data_from_json(json: &str) -> Result<Vec<(String, Value)>, SessionError> {
    let value: JsonValue =
        serde_json::from_str(json).map_err(|e| SessionError::InvalidEvent(e.to_string()))?;
    let JsonValue::Object(fields) = value else {
        return Err(SessionError::InvalidEvent(
            "stream data must be a JSON object".into(),
        ));
    };

    fields
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::Number(n) => n
                    .as_f64()
                    .map(Value::Number)
                    .ok_or_else(|| SessionError::InvalidEvent(format!("{key}: not a finite number")))?,
                JsonValue::String(s) => Value::Text(s),
                JsonValue::Bool(b) => Value::Text(b.to_string()),
                other => {
                    return Err(SessionError::InvalidEvent(format!(
                        "{key}: unsupported value {other}"
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// `edge` 引数（`"start"` / `"end"` / 省略）を解釈する
pub fn parse_edge(edge: Option<&str>) -> Result<Option<EdgeMarker>, SessionError> {
    match edge {
        None | Some("") => Ok(None),
        Some(name) => EdgeMarker::parse(name)
            .map(Some)
            .ok_or_else(|| SessionError::InvalidEvent(format!("unknown edge marker {name:?}"))),
    }
}

/// サンプルを JS に渡すオブジェクトにする
///
/// ```json
/// {"type":"accelchange","stream":"accel","dispatchTime":1050,"_time":50,"x":1,"y":3}
/// ```
pub fn sample_to_json(sample: &SampleEvent) -> JsonValue {
    let mut object = Map::new();
    object.insert("type".into(), JsonValue::String(sample.event_type()));
    object.insert("stream".into(), JsonValue::String(sample.stream.clone()));
    object.insert("dispatchTime".into(), JsonValue::from(sample.dispatch_time_ms));

    for (name, value) in &sample.properties {
        let value = match value {
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(s) => JsonValue::String(s.clone()),
        };
        object.insert(name.clone(), value);
    }

    JsonValue::Object(object)
}

/// エラー通知を JS に渡すオブジェクトにする
pub fn error_to_json(err: &SessionError) -> JsonValue {
    let kind = match err {
        SessionError::ConnectionFailed(_) => "connection",
        SessionError::SendFailed(_) => "send",
        SessionError::Channel { .. } => "channel",
        _ => "session",
    };
    let mut object = json!({ "kind": kind, "message": err.to_string() });
    if let (SessionError::Channel { code, description }, JsonValue::Object(map)) = (err, &mut object)
    {
        map.insert("code".into(), JsonValue::String(code.clone()));
        map.insert("description".into(), JsonValue::String(description.clone()));
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_codec::SampleKind;
    use stitch_transport::TransportError;

    #[test]
    fn test_stream_data() {
        let data = stream_data_from_json(r#"{"x":1,"label":"left","down":true}"#).unwrap();
        assert!(data.contains(&("x".to_string(), Value::Number(1.0))));
        assert!(data.contains(&("label".to_string(), Value::Text("left".into()))));
        assert!(data.contains(&("down".to_string(), Value::Text("true".into()))));
    }

    #[test]
    fn test_stream_data_rejects_nested() {
        assert!(stream_data_from_json(r#"{"x":[1,2]}"#).is_err());
        assert!(stream_data_from_json(r#"{"x":null}"#).is_err());
        assert!(stream_data_from_json("[1]").is_err());
    }

    #[test]
    fn test_parse_edge() {
        assert_eq!(parse_edge(None).unwrap(), None);
        assert_eq!(parse_edge(Some("start")).unwrap(), Some(EdgeMarker::Start));
        assert_eq!(parse_edge(Some("_end")).unwrap(), Some(EdgeMarker::End));
        assert!(parse_edge(Some("middle")).is_err());
    }

    #[test]
    fn test_sample_object() {
        let sample = SampleEvent {
            stream: "accel".into(),
            kind: SampleKind::Start,
            properties: vec![
                ("_time".into(), Value::Number(50.0)),
                ("x".into(), Value::Number(1.5)),
                ("hand".into(), Value::Text("left".into())),
            ],
            dispatch_time_ms: 1050,
        };
        assert_eq!(
            sample_to_json(&sample),
            json!({
                "type": "accelstart",
                "stream": "accel",
                "dispatchTime": 1050,
                "_time": 50.0,
                "x": 1.5,
                "hand": "left"
            })
        );
    }

    #[test]
    fn test_channel_error_object() {
        let err = SessionError::Channel {
            code: "401".into(),
            description: "token timed out".into(),
        };
        let object = error_to_json(&err);
        assert_eq!(object["kind"], "channel");
        assert_eq!(object["code"], "401");

        let err = SessionError::ConnectionFailed(TransportError::Rejected("full".into()));
        assert_eq!(error_to_json(&err)["kind"], "connection");
    }
}
