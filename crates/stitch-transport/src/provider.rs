//! 外部協調者のインターフェース
//!
//! どちらも fire-and-forget。結果は後から `TransportEvent` として戻ってくる。

use core::fmt;

/// 送信リクエストの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// チャンネル接続の識別子
///
/// 切断後に届いた古いチャンネルのイベントを捨てるために使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// POST の失敗内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFailure {
    /// HTTP ステータス（ネットワークエラーなら `None`）
    pub status: Option<u16>,
    pub reason: String,
}

impl PostFailure {
    pub fn new(status: Option<u16>, reason: impl Into<String>) -> Self {
        PostFailure {
            status,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.reason, status),
            None => f.write_str(&self.reason),
        }
    }
}

/// HTTP POST を行う協調者
///
/// トークン取得と送信メッセージの両方に使う。
/// 完了したら `TransportEvent::PostCompleted` を返すこと。
pub trait RequestSender {
    fn post(&mut self, request: RequestId, uri: &str, body: &str);
}

/// プッシュチャンネルを開閉する協調者
///
/// `open` 後の通知は同じ `ChannelId` を付けて `TransportEvent` で返すこと。
pub trait ChannelProvider {
    fn open(&mut self, channel: ChannelId, token: &str);
    fn close(&mut self, channel: ChannelId);
}

/// 協調者から戻ってくる完了通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// POST 完了。成功時はレスポンス Body
    PostCompleted {
        request: RequestId,
        outcome: Result<String, PostFailure>,
    },
    ChannelOpened {
        channel: ChannelId,
    },
    ChannelMessage {
        channel: ChannelId,
        data: String,
    },
    ChannelError {
        channel: ChannelId,
        code: String,
        description: String,
    },
    ChannelClosed {
        channel: ChannelId,
    },
}
