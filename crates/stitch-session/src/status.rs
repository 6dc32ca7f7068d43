//! セッション状態

use core::fmt;

/// セッションの接続状態
///
/// ホストとコントローラーで意味が少し異なる:
/// - `Disconnected`: チャンネルは開いたが相手がいない（ホストの待機状態）
/// - `Connecting`: 相手の存在が未確認（コントローラーはポーリング中）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// 未初期化
    Unknown,
    /// サーバーにトークンを要求中
    Contacting,
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unknown => "unknown",
            SessionStatus::Contacting => "contacting-server",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
