//! 連続ストリームの Reader と再生スケジューリング
//!
//! 受信したトークン列からサンプルを復元し、送信側の相対時刻に合わせて
//! 滑らかにディスパッチする。ネットワークのバースト到着を均し、
//! 同種の古いサンプルは最新の 1 件にまとめる（エッジマーカーは落とさない）。

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::error::CodecError;
use crate::token::{EdgeMarker, SampleKind, Value};
use crate::{DISPATCH_LOOKAHEAD_MS, MIN_RESCHEDULE_MS, REGISTER_TAG, TIME_PROPERTY};

/// 復元されたサンプルイベント
///
/// デコードからディスパッチまでの間だけ存在する。
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEvent {
    /// ストリームの可読名
    pub stream: String,
    /// 開始 / 終了 / 変化
    pub kind: SampleKind,
    /// スキーマ順のプロパティ（`_time` を含む）
    pub properties: Vec<(String, Value)>,
    /// 受信側の時計でのディスパッチ予定時刻（ミリ秒）
    pub dispatch_time_ms: u64,
}

impl SampleEvent {
    /// アプリケーションに見せるイベント名（`accelchange` など）
    pub fn event_type(&self) -> String {
        format!("{}{}", self.stream, self.kind.suffix())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// 送信側ウィンドウ開始からの相対時刻
    pub fn relative_time_ms(&self) -> u64 {
        self.get(TIME_PROPERTY)
            .and_then(Value::as_f64)
            .filter(|t| *t >= 0.0)
            .map(|t| t as u64)
            .unwrap_or(0)
    }
}

/// 1 本のストリームのデコーダ兼再生キュー
#[derive(Debug, Clone)]
pub struct StreamReader {
    name: String,
    /// 宣言順のプロパティ名
    property_names: Vec<String>,
    /// ディスパッチ待ちのサンプル（到着順。タイムスタンプで並べ替えない）
    queue: VecDeque<SampleEvent>,
    /// 次のディスパッチパスの予定時刻。`None` ならアイドル
    next_dispatch_ms: Option<u64>,
    lookahead_ms: u64,
    min_reschedule_ms: u64,
}

impl StreamReader {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timing(name, DISPATCH_LOOKAHEAD_MS, MIN_RESCHEDULE_MS)
    }

    /// 先読み幅と最小再スケジュール間隔を指定して生成する
    pub fn with_timing(name: impl Into<String>, lookahead_ms: u64, min_reschedule_ms: u64) -> Self {
        StreamReader {
            name: name.into(),
            property_names: Vec::new(),
            queue: VecDeque::new(),
            next_dispatch_ms: None,
            lookahead_ms,
            min_reschedule_ms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn next_dispatch_ms(&self) -> Option<u64> {
        self.next_dispatch_ms
    }

    /// 登録ブロック（プロパティ数 + 各プロパティ名）を読む
    ///
    /// 後から届いた登録ブロックは保持中のスキーマを丸ごと置き換える。
    ///
    /// # 戻り値
    /// 読み終えた位置
    pub fn read_protocol(&mut self, tokens: &[&str], mut pos: usize) -> Result<usize, CodecError> {
        let count_token = *tokens.get(pos).ok_or(CodecError::Truncated(pos))?;
        let count: usize = count_token
            .parse()
            .map_err(|_| CodecError::InvalidCount(count_token.to_string()))?;
        pos += 1;

        let end = pos
            .checked_add(count)
            .ok_or(CodecError::Truncated(tokens.len()))?;
        let names = tokens
            .get(pos..end)
            .ok_or(CodecError::Truncated(tokens.len()))?;
        self.property_names = names.iter().map(|name| name.to_string()).collect();

        Ok(end)
    }

    /// サンプルを 1 件読み、ディスパッチキューに積む
    ///
    /// # 引数
    /// - `now_ms`: 受信側の現在時刻
    /// - `base_ms`: フレームの開始時刻を受信側の時計に換算した値
    /// - `tokens`, `pos`: フレームのトークン列と読み出し位置（ID の直後）
    ///
    /// # 戻り値
    /// 読み終えた位置
    pub fn read_data(
        &mut self,
        now_ms: u64,
        base_ms: u64,
        tokens: &[&str],
        mut pos: usize,
    ) -> Result<usize, CodecError> {
        let edge = tokens.get(pos).and_then(|token| EdgeMarker::from_token(token));
        if edge.is_some() {
            pos += 1;
        }

        let end = pos + self.property_names.len();
        let values = tokens
            .get(pos..end)
            .ok_or(CodecError::Truncated(tokens.len()))?;

        let properties: Vec<(String, Value)> = self
            .property_names
            .iter()
            .zip(values)
            .map(|(name, token)| (name.clone(), Value::from_token(token)))
            .collect();

        let mut event = SampleEvent {
            stream: self.name.clone(),
            kind: SampleKind::from(edge),
            properties,
            dispatch_time_ms: 0,
        };
        // `_time` は相手側の任意の値なので飽和させる
        event.dispatch_time_ms = base_ms.saturating_add(event.relative_time_ms());

        self.queue.push_back(event);

        // アイドル状態からの最初の 1 件なら、次の tick でディスパッチパスを走らせる
        if self.next_dispatch_ms.is_none() {
            self.next_dispatch_ms = Some(now_ms);
        }

        Ok(end)
    }

    /// ディスパッチパスを 1 回実行する
    ///
    /// 先頭から順に見ていき、
    /// - 次のサンプルも変化サンプルで、かつ期限内なら今のサンプルは読み飛ばす（合体）
    /// - 期限内ならディスパッチ
    /// - 期限外ならそこで打ち切る
    ///
    /// 見終えたサンプルはキューから取り除き、残りがあれば再スケジュールする。
    ///
    /// # 戻り値
    /// ディスパッチすべきサンプル（到着順）
    pub fn dispatch(&mut self, now_ms: u64) -> Vec<SampleEvent> {
        let deadline = now_ms.saturating_add(self.lookahead_ms);
        let mut deliver = Vec::new();

        for (i, event) in self.queue.iter().enumerate() {
            if let Some(next) = self.queue.get(i + 1) {
                if event.kind == SampleKind::Change
                    && next.kind == SampleKind::Change
                    && next.dispatch_time_ms <= deadline
                {
                    deliver.push(false);
                    continue;
                }
            }

            if event.dispatch_time_ms <= deadline {
                deliver.push(true);
            } else {
                break;
            }
        }

        let visited = deliver.len();
        let ready: Vec<SampleEvent> = deliver
            .into_iter()
            .zip(self.queue.drain(..visited))
            .filter_map(|(keep, event)| keep.then_some(event))
            .collect();

        self.next_dispatch_ms = self.queue.front().map(|next| {
            let wait = next.dispatch_time_ms.saturating_sub(now_ms);
            now_ms.saturating_add(wait.max(self.min_reschedule_ms))
        });

        ready
    }

    /// 未ディスパッチのサンプルを破棄してアイドルに戻す
    pub fn clear(&mut self) {
        self.queue.clear();
        self.next_dispatch_ms = None;
    }
}

/// 受信側の全ストリーム（短縮 ID → Reader）
#[derive(Debug, Clone)]
pub struct ReaderSet {
    readers: BTreeMap<String, StreamReader>,
    lookahead_ms: u64,
    min_reschedule_ms: u64,
}

impl ReaderSet {
    pub fn new(lookahead_ms: u64, min_reschedule_ms: u64) -> Self {
        ReaderSet {
            readers: BTreeMap::new(),
            lookahead_ms,
            min_reschedule_ms,
        }
    }

    pub fn get(&self, id: &str) -> Option<&StreamReader> {
        self.readers.get(id)
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// フレーム本体（ヘッダーを除いたトークン列）を解釈する
    ///
    /// 登録ブロックは Reader を生成・更新し、サンプルは各 Reader のキューに積む。
    /// 途中でエラーになった場合、それまでに積んだサンプルは残したまま
    /// 残りのトークンの解釈をやめてエラーを返す。
    ///
    /// # 戻り値
    /// キューに積んだサンプル数
    pub fn read_frame(
        &mut self,
        tokens: &[&str],
        now_ms: u64,
        base_ms: u64,
    ) -> Result<usize, CodecError> {
        let mut pos = 0;
        let mut samples = 0;

        while pos < tokens.len() {
            let id = tokens[pos];
            pos += 1;

            if id == REGISTER_TAG {
                let (name, stream_id) = match tokens.get(pos..pos + 2) {
                    Some([name, stream_id]) => (*name, *stream_id),
                    _ => return Err(CodecError::Truncated(tokens.len())),
                };
                pos += 2;

                let (lookahead, min_reschedule) = (self.lookahead_ms, self.min_reschedule_ms);
                let reader = self
                    .readers
                    .entry(stream_id.to_string())
                    .or_insert_with(|| StreamReader::with_timing(name, lookahead, min_reschedule));
                reader.name = name.to_string();
                pos = reader.read_protocol(tokens, pos)?;

                debug!(
                    target: "stitch.codec",
                    stream = name,
                    id = stream_id,
                    properties = reader.property_names.len(),
                    "registered stream schema"
                );
            } else if let Some(reader) = self.readers.get_mut(id) {
                pos = reader.read_data(now_ms, base_ms, tokens, pos)?;
                samples += 1;
            } else {
                return Err(CodecError::UnknownStream {
                    id: id.to_string(),
                    pos: pos - 1,
                });
            }
        }

        Ok(samples)
    }

    /// 予定時刻に達したすべてのストリームでディスパッチパスを実行する
    pub fn dispatch_due(&mut self, now_ms: u64) -> Vec<SampleEvent> {
        let mut ready = Vec::new();
        for reader in self.readers.values_mut() {
            if reader.next_dispatch_ms.is_some_and(|due| due <= now_ms) {
                ready.extend(reader.dispatch(now_ms));
            }
        }
        ready
    }

    /// 最も早いディスパッチ予定時刻
    pub fn next_wakeup(&self) -> Option<u64> {
        self.readers
            .values()
            .filter_map(StreamReader::next_dispatch_ms)
            .min()
    }

    /// 全ストリームの再生キューを破棄する（スキーマは保持）
    pub fn clear_pending(&mut self) {
        for reader in self.readers.values_mut() {
            reader.clear();
        }
    }
}
