//! # stitch-wasm
//!
//! wasm-bindgen エクスポート：ブラウザのページ（ホスト画面・コントローラー画面）から呼び出す公開 API。
//!
//! HTTP 送信とプッシュチャンネルはページ側の JS が受け持ち、
//! 結果を `postCompleted` / `channel*` で戻す。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import { StitchClient, initPanicHook, initLogging } from './pkg/stitch_wasm';
//!
//! initPanicHook();
//! initLogging();
//!
//! const client = StitchClient.controller('{"key":"4821"}', {
//!     post: (id, uri, body) =>
//!         fetch(uri, { method: 'POST', body })
//!             .then(r => r.text())
//!             .then(text => client.postCompleted(id, text, Date.now()))
//!             .catch(e => client.postFailed(id, undefined, String(e), Date.now())),
//!     open: (channelId, token) => openChannel(channelId, token),
//!     close: (channelId) => closeChannel(channelId),
//! });
//!
//! client.onStatus(status => console.log(status));
//! client.onSample(sample => console.log(sample.type, sample.x));
//! client.connect(undefined, Date.now());
//!
//! // タイマー: 戻り値の時刻に再度 tick する
//! function pump() {
//!     const next = client.tick(Date.now());
//!     if (next !== undefined) setTimeout(pump, Math.max(0, next - Date.now()));
//! }
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod convert;
pub mod deferred;

pub use client::StitchClient;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen(js_name = "initPanicHook")]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// tracing の出力先をブラウザコンソールにする
///
/// 2 回目以降の呼び出しは何もしない。
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging() {
    #[cfg(target_arch = "wasm32")]
    {
        let _ = tracing_wasm::try_set_as_global_default();
    }
}
