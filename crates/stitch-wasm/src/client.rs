//! StitchClient wasm-bindgen エクスポート
//!
//! ホスト / コントローラーのセッションを JS から操作する主エントリポイント。
//! HTTP 送信とチャンネル開閉は JS のコールバックに委ね、完了は
//! `postCompleted` / `channel*` メソッドでセッションに戻す。
//!
//! JS のコールバック（協調者・購読者）はセッションの借用を返してから呼ぶので、
//! コールバックの中から `status()` や `postCompleted()` を同期的に呼んでよい。

use js_sys::{Array, Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use stitch_session::{Controller, Host, Session, SessionConfig, SubscriptionId};
use stitch_transport::{
    ChannelId, ChannelProvider, PostFailure, RequestId, RequestSender, TransportEvent,
};
use tracing::warn;

use crate::convert::{error_to_json, parse_edge, sample_to_json, stream_data_from_json};
use crate::deferred::{Deferred, Outbox};

/// 借用の外で行う JS 関数呼び出し
struct JsCall {
    function: Function,
    args: Array,
    what: &'static str,
}

impl JsCall {
    fn new(function: &Function, args: Array, what: &'static str) -> Self {
        JsCall {
            function: function.clone(),
            args,
            what,
        }
    }

    fn invoke(self) {
        if self.function.apply(&JsValue::NULL, &self.args).is_err() {
            warn!(target: "stitch.wasm", callback = self.what, "callback threw");
        }
    }
}

/// `callbacks.post(requestId, uri, body)` を呼ぶ送信者
struct JsRequestSender {
    post: Function,
    outbox: Outbox<JsCall>,
}

impl RequestSender for JsRequestSender {
    fn post(&mut self, request: RequestId, uri: &str, body: &str) {
        let args = Array::of3(
            &JsValue::from_f64(request.0 as f64),
            &JsValue::from_str(uri),
            &JsValue::from_str(body),
        );
        self.outbox.push(JsCall::new(&self.post, args, "post"));
    }
}

/// `callbacks.open(channelId, token)` / `callbacks.close(channelId)` を呼ぶプロバイダ
struct JsChannelProvider {
    open: Function,
    close: Function,
    outbox: Outbox<JsCall>,
}

impl ChannelProvider for JsChannelProvider {
    fn open(&mut self, channel: ChannelId, token: &str) {
        let args = Array::of2(
            &JsValue::from_f64(channel.0 as f64),
            &JsValue::from_str(token),
        );
        self.outbox.push(JsCall::new(&self.open, args, "open"));
    }

    fn close(&mut self, channel: ChannelId) {
        let args = Array::of1(&JsValue::from_f64(channel.0 as f64));
        self.outbox.push(JsCall::new(&self.close, args, "close"));
    }
}

enum Peer {
    Host(Host),
    Controller(Controller),
}

impl Peer {
    fn session(&self) -> &Session {
        match self {
            Peer::Host(host) => host,
            Peer::Controller(controller) => controller,
        }
    }

    fn session_mut(&mut self) -> &mut Session {
        match self {
            Peer::Host(host) => host,
            Peer::Controller(controller) => controller,
        }
    }
}

/// ホスト / コントローラーのセッション
///
/// ## 内部アーキテクチャ
///
/// ```text
/// StitchClient
///   └── Deferred            (stitch-wasm)    - JS 呼び出しを借用の外で配送
///         └── Host | Controller (stitch-session) - 接続確認の方針とキーの扱い
///               └── Session (stitch-session) - 状態機械・振り分け・スロットル
///                     ├── Transport  (stitch-transport) - トークン発行・チャンネル・送信
///                     └── Writer / Reader (stitch-codec) - 連続ストリームの符号化と再生
/// ```
///
/// ## スレッド安全性
///
/// WASM はシングルスレッドのため、`!Send + !Sync` を満たす。
/// JS からは単一スレッドで呼び出される前提。
///
/// メソッドはすべて `&self` で受け、可変借用はセッション操作の間だけに限る。
#[wasm_bindgen]
pub struct StitchClient {
    inner: Deferred<Peer, JsCall>,
}

#[wasm_bindgen]
impl StitchClient {
    /// ホスト（大画面側）を作る
    ///
    /// # 引数
    /// - `options`: `SessionConfig` の JSON（`"{}"` ならすべてデフォルト）
    /// - `callbacks`: `{ post, open, close }` を持つ JS オブジェクト
    ///
    /// # エラー
    /// - 設定 JSON が読めない
    /// - コールバックが関数でない
    #[wasm_bindgen]
    pub fn host(options: &str, callbacks: &JsValue) -> Result<StitchClient, JsError> {
        let config = SessionConfig::from_json(options)?;
        let outbox = Outbox::default();
        let (sender, provider) = collaborators(callbacks, &outbox)?;
        let peer = Peer::Host(Host::new(config, sender, provider));
        Ok(StitchClient {
            inner: Deferred::new(peer, outbox),
        })
    }

    /// コントローラー（手元の端末側）を作る
    ///
    /// 引数は `host` と同じ。`options.key` が参加するセッションの既定値になる。
    #[wasm_bindgen]
    pub fn controller(options: &str, callbacks: &JsValue) -> Result<StitchClient, JsError> {
        let config = SessionConfig::from_json(options)?;
        let outbox = Outbox::default();
        let (sender, provider) = collaborators(callbacks, &outbox)?;
        let peer = Peer::Controller(Controller::new(config, sender, provider));
        Ok(StitchClient {
            inner: Deferred::new(peer, outbox),
        })
    }

    /// 接続を開始する
    ///
    /// # 引数
    /// - `key`: セッションキー。ホストは省略でサーバー生成、コントローラーは省略で `options.key`
    /// - `now_ms`: 現在時刻（`Date.now()`）
    ///
    /// # エラー
    /// - コントローラーでキーがどこにもない
    #[wasm_bindgen]
    pub fn connect(&self, key: Option<String>, now_ms: f64) -> Result<(), JsError> {
        let now_ms = now_ms as u64;
        let result = self.inner.with(|peer| match peer {
            Peer::Host(host) => {
                host.connect(key.as_deref(), now_ms);
                Ok(())
            }
            Peer::Controller(controller) => controller.connect(key.as_deref(), now_ms),
        });
        self.flush();
        result?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn disconnect(&self, now_ms: f64) {
        self.apply(|session| session.disconnect(now_ms as u64));
    }

    /// ホストを相手待ちから `connecting` に進める
    ///
    /// # 戻り値
    /// 状態が変わった場合 `true`。コントローラーでは常に `false`
    #[wasm_bindgen(js_name = "waitForClient")]
    pub fn wait_for_client(&self, now_ms: f64) -> bool {
        let changed = self.inner.with(|peer| match peer {
            Peer::Host(host) => host.wait_for_client(now_ms as u64),
            Peer::Controller(_) => false,
        });
        self.flush();
        changed
    }

    /// 現在のセッションキー
    #[wasm_bindgen]
    pub fn code(&self) -> Option<String> {
        self.inner.read().session().key().map(str::to_string)
    }

    /// 現在の状態（`"unknown"` / `"contacting-server"` / `"disconnected"` / `"connecting"` / `"connected"`）
    #[wasm_bindgen]
    pub fn status(&self) -> String {
        self.inner.read().session().status().as_str().to_string()
    }

    /// 離散イベントを送る
    ///
    /// # 引数
    /// - `json`: `type` フィールドを持つ JSON オブジェクト文字列
    ///
    /// # エラー
    /// - 接続中でない
    /// - `type` を持つ JSON オブジェクトでない
    #[wasm_bindgen(js_name = "sendEvent")]
    pub fn send_event(&self, json: &str) -> Result<(), JsError> {
        self.apply(|session| session.send_event_json(json))?;
        Ok(())
    }

    /// 連続ストリームにサンプルを書き込む
    ///
    /// # 引数
    /// - `name`: ストリーム名（例: `"accel"`）
    /// - `data`: プロパティの JSON オブジェクト文字列（例: `{"x":1,"y":2}`）
    /// - `edge`: `"start"` / `"end"` / 省略
    /// - `now_ms`: 現在時刻（`Date.now()`）
    ///
    /// # エラー
    /// - 接続中でない
    /// - `data` が数値・文字列・真偽値だけのオブジェクトでない
    /// - 名前・キー・値に `,` を含む
    #[wasm_bindgen(js_name = "sendEventStream")]
    pub fn send_event_stream(
        &self,
        name: &str,
        data: &str,
        edge: Option<String>,
        now_ms: f64,
    ) -> Result<(), JsError> {
        let properties = stream_data_from_json(data)?;
        let edge = parse_edge(edge.as_deref())?;
        self.apply(|session| session.write_stream(name, properties, edge, now_ms as u64))?;
        Ok(())
    }

    /// 期限に達したタイマーを処理する
    ///
    /// # 戻り値
    /// 次に `tick` を呼ぶべき時刻。タイマーがなければ `undefined`
    #[wasm_bindgen]
    pub fn tick(&self, now_ms: f64) -> Option<f64> {
        self.apply(|session| session.tick(now_ms as u64));
        self.next_wakeup()
    }

    #[wasm_bindgen(js_name = "nextWakeup")]
    pub fn next_wakeup(&self) -> Option<f64> {
        self.inner.read().session().next_wakeup().map(|t| t as f64)
    }

    // ===== 協調者からの完了通知 =====

    /// `post` が成功した（レスポンス Body を渡す）
    #[wasm_bindgen(js_name = "postCompleted")]
    pub fn post_completed(&self, request_id: f64, body: String, now_ms: f64) {
        self.feed(
            TransportEvent::PostCompleted {
                request: RequestId(request_id as u64),
                outcome: Ok(body),
            },
            now_ms,
        );
    }

    /// `post` が失敗した
    #[wasm_bindgen(js_name = "postFailed")]
    pub fn post_failed(&self, request_id: f64, status: Option<u16>, reason: String, now_ms: f64) {
        self.feed(
            TransportEvent::PostCompleted {
                request: RequestId(request_id as u64),
                outcome: Err(PostFailure::new(status, reason)),
            },
            now_ms,
        );
    }

    #[wasm_bindgen(js_name = "channelOpened")]
    pub fn channel_opened(&self, channel_id: f64, now_ms: f64) {
        self.feed(
            TransportEvent::ChannelOpened {
                channel: ChannelId(channel_id as u64),
            },
            now_ms,
        );
    }

    #[wasm_bindgen(js_name = "channelMessage")]
    pub fn channel_message(&self, channel_id: f64, data: String, now_ms: f64) {
        self.feed(
            TransportEvent::ChannelMessage {
                channel: ChannelId(channel_id as u64),
                data,
            },
            now_ms,
        );
    }

    #[wasm_bindgen(js_name = "channelError")]
    pub fn channel_error(&self, channel_id: f64, code: String, description: String, now_ms: f64) {
        self.feed(
            TransportEvent::ChannelError {
                channel: ChannelId(channel_id as u64),
                code,
                description,
            },
            now_ms,
        );
    }

    #[wasm_bindgen(js_name = "channelClosed")]
    pub fn channel_closed(&self, channel_id: f64, now_ms: f64) {
        self.feed(
            TransportEvent::ChannelClosed {
                channel: ChannelId(channel_id as u64),
            },
            now_ms,
        );
    }

    // ===== 通知の購読 =====

    /// 状態変化を購読する（引数は状態名の文字列）
    #[wasm_bindgen(js_name = "onStatus")]
    pub fn on_status(&self, callback: Function) -> f64 {
        let outbox = self.inner.outbox();
        let id = self.apply(|session| {
            session.subscribe_status(move |status| {
                let args = Array::of1(&JsValue::from_str(status.as_str()));
                outbox.push(JsCall::new(&callback, args, "onStatus"));
            })
        });
        id.0 as f64
    }

    /// 離散イベントを購読する（引数は JSON から作ったオブジェクト）
    #[wasm_bindgen(js_name = "onEvent")]
    pub fn on_event(&self, callback: Function) -> f64 {
        let outbox = self.inner.outbox();
        let id = self.apply(|session| {
            session.subscribe_event(move |event| {
                let args = Array::of1(&to_js(&event.to_json()));
                outbox.push(JsCall::new(&callback, args, "onEvent"));
            })
        });
        id.0 as f64
    }

    /// 連続ストリームのサンプルを購読する
    ///
    /// 引数は `{type, stream, dispatchTime, _time, ...properties}` のオブジェクト。
    #[wasm_bindgen(js_name = "onSample")]
    pub fn on_sample(&self, callback: Function) -> f64 {
        let outbox = self.inner.outbox();
        let id = self.apply(|session| {
            session.subscribe_sample(move |sample| {
                let args = Array::of1(&to_js(&sample_to_json(sample).to_string()));
                outbox.push(JsCall::new(&callback, args, "onSample"));
            })
        });
        id.0 as f64
    }

    /// エラー通知を購読する（引数は `{kind, message, code?, description?}`）
    #[wasm_bindgen(js_name = "onError")]
    pub fn on_error(&self, callback: Function) -> f64 {
        let outbox = self.inner.outbox();
        let id = self.apply(|session| {
            session.subscribe_error(move |err| {
                let args = Array::of1(&to_js(&error_to_json(err).to_string()));
                outbox.push(JsCall::new(&callback, args, "onError"));
            })
        });
        id.0 as f64
    }

    #[wasm_bindgen]
    pub fn unsubscribe(&self, subscription: f64) -> bool {
        self.apply(|session| session.unsubscribe(SubscriptionId(subscription as u64)))
    }
}

impl StitchClient {
    /// セッションを操作し、借用を返してから積まれた JS 呼び出しを配送する
    fn apply<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let result = self.inner.with(|peer| f(peer.session_mut()));
        self.flush();
        result
    }

    fn flush(&self) {
        self.inner.drain(JsCall::invoke);
    }

    fn feed(&self, event: TransportEvent, now_ms: f64) {
        self.apply(|session| session.handle_transport_event(event, now_ms as u64));
    }
}

/// `callbacks` オブジェクトから協調者を組み立てる
fn collaborators(
    callbacks: &JsValue,
    outbox: &Outbox<JsCall>,
) -> Result<(Box<dyn RequestSender>, Box<dyn ChannelProvider>), JsError> {
    let sender = JsRequestSender {
        post: callback(callbacks, "post")?,
        outbox: outbox.clone(),
    };
    let provider = JsChannelProvider {
        open: callback(callbacks, "open")?,
        close: callback(callbacks, "close")?,
        outbox: outbox.clone(),
    };
    Ok((Box::new(sender), Box::new(provider)))
}

fn callback(callbacks: &JsValue, name: &str) -> Result<Function, JsError> {
    Reflect::get(callbacks, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| JsError::new(&format!("callbacks.{} must be a function", name)))
}

fn to_js(json: &str) -> JsValue {
    js_sys::JSON::parse(json).unwrap_or(JsValue::UNDEFINED)
}
