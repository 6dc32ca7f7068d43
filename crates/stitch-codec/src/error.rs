//! stitch-codec エラー型

use thiserror::Error;

/// コーデック層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// トークンにフレーム区切り文字 `,` が含まれている
    #[error("token contains a frame separator: {0:?}")]
    InvalidToken(String),
    /// メッセージが `[` で始まっていない
    #[error("message is not a stream frame")]
    NotAFrame,
    /// フレームヘッダー（開始時刻・継続時間）が不正
    #[error("invalid frame header: {0:?}")]
    InvalidHeader(String),
    /// 登録ブロックのプロパティ数が不正
    #[error("invalid property count: {0:?}")]
    InvalidCount(String),
    /// 宣言された数のトークンが揃っていない
    #[error("frame truncated at token {0}")]
    Truncated(usize),
    /// 登録されていないストリーム ID（以降の位置が追跡できない）
    #[error("unregistered stream id {id:?} at token {pos}")]
    UnknownStream { id: String, pos: usize },
}
