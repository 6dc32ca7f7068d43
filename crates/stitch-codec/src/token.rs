//! トークンと値の表現

use core::fmt;

use crate::error::CodecError;
use crate::{END_TAG, START_TAG};

/// サンプルのプロパティ値
///
/// Wire 上はすべて文字列トークン。デコード時は有限の数値として
/// 解釈できれば `Number`、それ以外は `Text` になる。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Wire トークンから値を復元する
    pub fn from_token(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(token.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    /// Wire トークンに変換する（`,` を含む文字列はフレームを壊すので拒否）
    pub fn to_token(&self) -> Result<String, CodecError> {
        let token = self.to_string();
        check_token(&token)?;
        Ok(token)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 の Display は 1.0 → "1"、2.5 → "2.5" と最短表現になる
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// ジェスチャの境界を示すマーカー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMarker {
    Start,
    End,
}

impl EdgeMarker {
    pub fn token(self) -> &'static str {
        match self {
            EdgeMarker::Start => START_TAG,
            EdgeMarker::End => END_TAG,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            START_TAG => Some(EdgeMarker::Start),
            END_TAG => Some(EdgeMarker::End),
            _ => None,
        }
    }

    /// アプリケーション側の表記（`"start"` / `"end"`）から変換する
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" | START_TAG => Some(EdgeMarker::Start),
            "end" | END_TAG => Some(EdgeMarker::End),
            _ => None,
        }
    }
}

/// 受信サンプルの種別
///
/// イベント名はストリーム名にサフィックスを付けたもの（`accelchange` など）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Start,
    End,
    Change,
}

impl SampleKind {
    pub fn suffix(self) -> &'static str {
        match self {
            SampleKind::Start => "start",
            SampleKind::End => "end",
            SampleKind::Change => "change",
        }
    }
}

impl From<Option<EdgeMarker>> for SampleKind {
    fn from(edge: Option<EdgeMarker>) -> Self {
        match edge {
            Some(EdgeMarker::Start) => SampleKind::Start,
            Some(EdgeMarker::End) => SampleKind::End,
            None => SampleKind::Change,
        }
    }
}

/// トークンとして安全に送れる文字列か検査する
pub(crate) fn check_token(token: &str) -> Result<(), CodecError> {
    if token.contains(',') {
        return Err(CodecError::InvalidToken(token.to_string()));
    }
    Ok(())
}
