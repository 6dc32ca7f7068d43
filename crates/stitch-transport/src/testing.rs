//! テスト用の記録する協調者
//!
//! 送信・チャンネル開閉を [`Log`] に記録するだけで、何も応答しない。
//! 応答は `TransportEvent` としてテスト側から戻す。

use std::cell::RefCell;
use std::rc::Rc;

use crate::provider::{ChannelId, ChannelProvider, RequestId, RequestSender};

#[derive(Debug, Default)]
pub struct Log {
    /// (リクエスト ID, URI, Body)
    pub posts: Vec<(RequestId, String, String)>,
    /// (チャンネル ID, トークン)
    pub opened: Vec<(ChannelId, String)>,
    pub closed: Vec<ChannelId>,
}

pub struct Recorder(pub Rc<RefCell<Log>>);

impl RequestSender for Recorder {
    fn post(&mut self, request: RequestId, uri: &str, body: &str) {
        self.0
            .borrow_mut()
            .posts
            .push((request, uri.to_string(), body.to_string()));
    }
}

impl ChannelProvider for Recorder {
    fn open(&mut self, channel: ChannelId, token: &str) {
        self.0.borrow_mut().opened.push((channel, token.to_string()));
    }

    fn close(&mut self, channel: ChannelId) {
        self.0.borrow_mut().closed.push(channel);
    }
}

/// 同じ [`Log`] に記録する送信者とプロバイダの組
pub fn recorder() -> (
    Box<dyn RequestSender>,
    Box<dyn ChannelProvider>,
    Rc<RefCell<Log>>,
) {
    let log = Rc::new(RefCell::new(Log::default()));
    (
        Box::new(Recorder(log.clone())),
        Box::new(Recorder(log.clone())),
        log,
    )
}
