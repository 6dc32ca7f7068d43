//! # stitch-session
//!
//! ホスト（大画面）とコントローラー（手元の端末）をつなぐセッションの状態機械。
//!
//! ## 概要
//!
//! - **離散イベント**: JSON オブジェクトを即時送信する（`send_event`）
//! - **連続ストリーム**: 高頻度のサンプルをバッファし、250ms ごとにまとめて送る
//!   （`write_stream`）。受信側は送信側の相対時刻どおりに再生する
//! - **制御文字列**: `connected` / `disconnected` で状態機械を駆動する
//!
//! すべてシングルスレッドの協調スケジューリング。タイマーは期限の時刻として保持し、
//! 埋め込み側が `tick(now_ms)` を呼んで進める（`next_wakeup()` で次の期限が分かる）。
//!
//! ## セッションの状態遷移
//!
//! ```text
//! Unknown ──connect──▶ Contacting ──opened──▶ Disconnected（Host）
//!                                         └─▶ Connecting（Controller、ポーリング開始）
//! Connecting / Disconnected ──"connected"──▶ Connected
//! Connected ──"disconnected"──▶ Disconnected
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod notify;
pub mod role;
pub mod session;
pub mod status;
pub mod throttle;
pub mod timer;

#[cfg(test)]
mod testutil;

pub use clock::ClockSync;
pub use config::{ReplayAnchor, SessionConfig};
pub use error::SessionError;
pub use event::AppEvent;
pub use notify::SubscriptionId;
pub use role::{Controller, Host, Role};
pub use session::Session;
pub use status::SessionStatus;

pub use stitch_codec::{EdgeMarker, SampleEvent, SampleKind, Value};
pub use stitch_codec::{DISPATCH_LOOKAHEAD_MS, MIN_RESCHEDULE_MS};

/// 連続ストリームの送信間隔（ミリ秒）
pub const POST_THROTTLE_MS: u64 = 250;

/// バッファが空のままこの時間が過ぎたらスロットルタイマーを止める（ミリ秒）
pub const THROTTLE_IDLE_TIMEOUT_MS: u64 = 2000;

/// コントローラーが接続確認をポーリングする間隔（ミリ秒）
pub const POLL_INTERVAL_MS: u64 = 2000;

/// 相手とつながったことを知らせる制御文字列
pub const CONNECTED_MESSAGE: &str = "connected";

/// 相手が離れたことを知らせる制御文字列
pub const DISCONNECTED_MESSAGE: &str = "disconnected";

/// コントローラーが送る接続確認ポーリング（送信専用）
pub const POLL_MESSAGE: &str = "_poll";
