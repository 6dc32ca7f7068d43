//! 送信リクエストのプール
//!
//! 高頻度の送信で毎回文字列バッファを確保し直さないように、
//! 完了したリクエストのバッファを再利用する。

use crate::provider::RequestId;

/// 送信中のリクエスト（URI と Body のバッファを持つ）
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    id: RequestId,
    uri: String,
    body: String,
}

impl OutboundRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// URI と Body を書き込む（既存の内容は消す）
    pub fn fill(&mut self, uri: &str, body_parts: &[&str]) {
        self.uri.clear();
        self.uri.push_str(uri);
        self.body.clear();
        for part in body_parts {
            self.body.push_str(part);
        }
    }
}

/// 再利用可能なリクエストのプール
#[derive(Debug)]
pub struct RequestPool {
    free: Vec<OutboundRequest>,
    capacity: usize,
    /// 新規に確保した総数（統計用）
    allocated: u64,
}

impl RequestPool {
    pub fn new(capacity: usize) -> Self {
        RequestPool {
            free: Vec::with_capacity(capacity),
            capacity,
            allocated: 0,
        }
    }

    /// プールから取り出す。空なら新しく確保する
    pub fn acquire(&mut self, id: RequestId) -> OutboundRequest {
        match self.free.pop() {
            Some(mut request) => {
                request.id = id;
                request
            }
            None => {
                self.allocated += 1;
                OutboundRequest {
                    id,
                    uri: String::new(),
                    body: String::new(),
                }
            }
        }
    }

    /// プールに戻す。満杯なら捨てる
    ///
    /// # 戻り値
    /// プールに戻したかどうか
    pub fn release(&mut self, request: OutboundRequest) -> bool {
        if self.free.len() < self.capacity {
            self.free.push(request);
            true
        } else {
            false
        }
    }

    /// プール中の空きリクエスト数
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}
