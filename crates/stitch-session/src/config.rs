//! セッション設定
//!
//! JS 側からオプションオブジェクトを JSON で渡せるよう camelCase で受け付ける。
//! 省略したフィールドはデフォルト値になる。
//!
//! ```json
//! { "connectUri": "/connect/", "key": "4821", "throttleMs": 250 }
//! ```

use serde::{Deserialize, Serialize};
use stitch_codec::{DISPATCH_LOOKAHEAD_MS, MIN_RESCHEDULE_MS};
use stitch_transport::{TransportConfig, DEFAULT_CONNECT_URI, DEFAULT_REQUEST_POOL_CAPACITY};

use crate::error::SessionError;
use crate::{POLL_INTERVAL_MS, POST_THROTTLE_MS, THROTTLE_IDLE_TIMEOUT_MS};

/// 受信サンプルの再生時刻をどの時計に合わせるか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayAnchor {
    /// フレーム開始時刻 + 時計オフセット + `_time`
    #[default]
    Sender,
    /// フレーム到着時刻 + `_time`（ネットワーク遅延の揺れがそのまま乗る）
    Arrival,
}

/// セッションの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// トークン発行の POST 先
    pub connect_uri: String,
    /// 接続時にキーを渡さなかった場合に使うセッションキー（コントローラー用）
    pub key: Option<String>,
    pub throttle_ms: u64,
    pub throttle_idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub dispatch_lookahead_ms: u64,
    pub min_reschedule_ms: u64,
    pub request_pool_capacity: usize,
    pub replay_anchor: ReplayAnchor,
}

impl SessionConfig {
    /// JSON 文字列から読み込む
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(&self.connect_uri).with_pool_capacity(self.request_pool_capacity)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_uri: DEFAULT_CONNECT_URI.to_string(),
            key: None,
            throttle_ms: POST_THROTTLE_MS,
            throttle_idle_timeout_ms: THROTTLE_IDLE_TIMEOUT_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            dispatch_lookahead_ms: DISPATCH_LOOKAHEAD_MS,
            min_reschedule_ms: MIN_RESCHEDULE_MS,
            request_pool_capacity: DEFAULT_REQUEST_POOL_CAPACITY,
            replay_anchor: ReplayAnchor::Sender,
        }
    }
}
