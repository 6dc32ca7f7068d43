//! # stitch-transport
//!
//! プッシュチャンネル型トランスポートのライフサイクル管理。
//!
//! 実際の HTTP 送信とチャンネル接続は外部の協調者（`RequestSender` /
//! `ChannelProvider`）が行い、このクレートは状態だけを持つ。
//! 協調者からの完了通知は `TransportEvent` として `Transport::handle_event` に戻す。
//!
//! ## 接続シーケンス
//!
//! ```text
//! connect(key?)
//!   → POST <connect_uri><key>                 （key なしならサーバーが生成）
//!   ← {"key","token","endpoint","id"?}        （または {"error": "..."}）
//!   → ChannelProvider::open(channel, token)
//!   ← ChannelOpened / ChannelMessage / ChannelError / ChannelClosed
//! ```
//!
//! ## 送信メッセージの Body
//!
//! ```text
//! k=<key>[&f=<id>]&m=<payload>
//! ```

pub mod error;
pub mod grant;
pub mod pool;
pub mod provider;
pub mod transport;

// 協調者を記録だけするテスト用ヘルパー（下流クレートのテストからも使う）
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::TransportError;
pub use grant::TokenGrant;
pub use pool::{OutboundRequest, RequestPool};
pub use provider::{ChannelId, ChannelProvider, PostFailure, RequestId, RequestSender, TransportEvent};
pub use transport::{Transport, TransportConfig, TransportNotice};

/// 接続 URI のデフォルト値
pub const DEFAULT_CONNECT_URI: &str = "/connect/";

/// 再利用する送信リクエストの最大保持数
pub const DEFAULT_REQUEST_POOL_CAPACITY: usize = 8;
