//! stitch-session エラー型

use stitch_codec::CodecError;
use stitch_transport::TransportError;
use thiserror::Error;

use crate::status::SessionStatus;

/// セッション層のエラー
///
/// 呼び出し時点で分かる失敗は `Result` で返し、
/// 非同期に起きた失敗（トークン発行・送信・チャンネル）はエラー通知で届く。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// 接続中でないと送れない
    #[error("session is not connected (status: {0})")]
    NotConnected(SessionStatus),
    /// コントローラーが参加するセッションキーがない
    #[error("no session key to join")]
    MissingKey,
    /// 離散イベントが `type` を持つ JSON オブジェクトでない
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// 設定が読めない
    #[error("invalid session config: {0}")]
    Config(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// トークン発行に失敗した
    #[error("connection failed: {0}")]
    ConnectionFailed(TransportError),
    /// メッセージの送信に失敗した
    #[error("send failed: {0}")]
    SendFailed(TransportError),
    /// チャンネルがエラーを報告した
    #[error("channel error {code}: {description}")]
    Channel { code: String, description: String },
}
