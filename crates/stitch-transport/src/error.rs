//! stitch-transport エラー型

use thiserror::Error;

use crate::provider::PostFailure;

/// トランスポート層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// メッセージ送信先がまだ割り当てられていない
    #[error("channel not granted: no message endpoint")]
    NotOpen,
    /// サーバーがトークン発行を拒否した（`{"error": ...}`）
    #[error("server rejected connection: {0}")]
    Rejected(String),
    /// トークン発行レスポンスが解釈できない
    #[error("invalid token grant: {0}")]
    InvalidGrant(String),
    /// 要求したキーと異なるキーでトークンが発行された
    #[error("granted key {granted:?} does not match requested key {requested:?}")]
    KeyMismatch { requested: String, granted: String },
    /// POST 自体が失敗した
    #[error("request failed: {0}")]
    PostFailed(PostFailure),
}
