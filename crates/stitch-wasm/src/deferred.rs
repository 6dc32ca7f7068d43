//! JS への呼び出しを借用の外で配送する仕組み
//!
//! セッションを `borrow_mut` している最中に JS のコールバックを呼ぶと、
//! コールバックから `StitchClient` を再び呼んだ時点で二重借用になる。
//! そこでセッション内部からの呼び出しはすべて [`Outbox`] に積み、
//! 借用を返してから [`Deferred::drain`] で 1 件ずつ配送する。
//!
//! ```text
//! export method ──▶ with(|session| ...) ──▶ Outbox に積む
//!               └─▶ drain ──▶ JS ──▶ export method（再入可）
//! ```

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// 配送待ちの呼び出し（FIFO）
///
/// セッションに渡す協調者や購読クロージャが clone して持つ。
pub struct Outbox<T> {
    queue: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Outbox {
            queue: self.queue.clone(),
        }
    }
}

impl<T> Default for Outbox<T> {
    fn default() -> Self {
        Outbox {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<T> Outbox<T> {
    pub fn push(&self, item: T) {
        self.queue.borrow_mut().push_back(item);
    }

    /// 先頭を取り出す（借用は戻り値を返す時点で解放される）
    pub fn pop(&self) -> Option<T> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// 状態と、その状態から発生した配送待ちの呼び出し
pub struct Deferred<S, T> {
    state: RefCell<S>,
    outbox: Outbox<T>,
}

impl<S, T> Deferred<S, T> {
    pub fn new(state: S, outbox: Outbox<T>) -> Self {
        Deferred {
            state: RefCell::new(state),
            outbox,
        }
    }

    /// 状態を書き換える
    ///
    /// クロージャの中で発生した呼び出しは配送されずに積まれるだけ。
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn read(&self) -> Ref<'_, S> {
        self.state.borrow()
    }

    /// 積まれた呼び出しを順に配送する
    ///
    /// `deliver` の実行中は状態もキューも借用していないので、
    /// `deliver` から `with` / `read` / `drain` を呼んでよい。
    /// 入れ子の `drain` が残りを先に配送しても順序は保たれる。
    pub fn drain(&self, mut deliver: impl FnMut(T)) {
        while let Some(item) = self.outbox.pop() {
            deliver(item);
        }
    }

    /// 状態の中に渡す協調者・購読クロージャ用の送り口
    pub fn outbox(&self) -> Outbox<T> {
        self.outbox.clone()
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_session::{Controller, SessionConfig, SessionStatus};
    use stitch_transport::{ChannelId, ChannelProvider, RequestId, RequestSender, TransportEvent};

    const GRANT: &str = r#"{"key":"4821","token":"tok","endpoint":"/message/4821","id":"48212"}"#;

    enum Call {
        Post { request: RequestId, body: String },
        Open(ChannelId),
        Status(SessionStatus),
    }

    struct Queued(Outbox<Call>);

    impl RequestSender for Queued {
        fn post(&mut self, request: RequestId, _uri: &str, body: &str) {
            self.0.push(Call::Post {
                request,
                body: body.to_string(),
            });
        }
    }

    impl ChannelProvider for Queued {
        fn open(&mut self, channel: ChannelId, _token: &str) {
            self.0.push(Call::Open(channel));
        }

        fn close(&mut self, _channel: ChannelId) {}
    }

    type Client = Deferred<Controller, Call>;

    fn client() -> Client {
        let outbox = Outbox::default();
        let mut controller = Controller::new(
            SessionConfig::default(),
            Box::new(Queued(outbox.clone())),
            Box::new(Queued(outbox.clone())),
        );
        let status_outbox = outbox.clone();
        controller.subscribe_status(move |status| status_outbox.push(Call::Status(*status)));
        Deferred::new(controller, outbox)
    }

    /// 協調者とサブスクライバーが同期的にクライアントを呼び返す
    fn deliver(client: &Client, call: Call, seen: &RefCell<Vec<(SessionStatus, SessionStatus)>>) {
        match call {
            Call::Post { request, body } if body.is_empty() => {
                client.with(|c| {
                    c.handle_transport_event(
                        TransportEvent::PostCompleted {
                            request,
                            outcome: Ok(GRANT.to_string()),
                        },
                        0,
                    )
                });
                flush(client, seen);
            }
            Call::Post { .. } => {}
            Call::Open(channel) => {
                client.with(|c| {
                    c.handle_transport_event(TransportEvent::ChannelOpened { channel }, 0)
                });
                flush(client, seen);
            }
            Call::Status(notified) => {
                let current = client.read().status();
                seen.borrow_mut().push((notified, current));
            }
        }
    }

    fn flush(client: &Client, seen: &RefCell<Vec<(SessionStatus, SessionStatus)>>) {
        client.drain(|call| deliver(client, call, seen));
    }

    #[test]
    fn test_calls_wait_until_borrow_released() {
        let client = client();
        client.with(|c| c.connect(Some("4821"), 0)).unwrap();

        // 状態通知とトークン要求は積まれただけ
        assert_eq!(client.pending(), 2);
        assert_eq!(client.read().status(), SessionStatus::Contacting);
    }

    #[test]
    fn test_callbacks_reenter_and_see_current_status() {
        let client = client();
        let seen = RefCell::new(Vec::new());

        client.with(|c| c.connect(Some("4821"), 0)).unwrap();
        flush(&client, &seen);

        assert_eq!(
            *seen.borrow(),
            [
                (SessionStatus::Contacting, SessionStatus::Contacting),
                (SessionStatus::Connecting, SessionStatus::Connecting),
            ]
        );
        assert_eq!(client.read().status(), SessionStatus::Connecting);
        assert_eq!(client.pending(), 0);
    }
}
