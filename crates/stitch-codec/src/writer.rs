//! 連続ストリームの Writer
//!
//! プロパティ更新をフレーム用トークン列に変換する。
//! スキーマ（プロパティ名の並び）は初回および拡張時にだけ登録ブロックとして送る。

use crate::error::CodecError;
use crate::token::{check_token, EdgeMarker, Value};
use crate::{REGISTER_TAG, TIME_PROPERTY};

/// 1 本の名前付きストリームのエンコーダ
///
/// 過去に書き込まれたすべてのプロパティ名と最新値を保持する。
/// 毎回スナップショット全体を書き出すので（差分ではない）、
/// Reader は直前の状態を持たなくてよい。
#[derive(Debug, Clone)]
pub struct StreamWriter {
    /// アプリケーションが使う可読名
    name: String,
    /// フレーム内で使う短縮 ID（`g0` など）
    id: String,
    /// プロパティ名と最新値。`_time` が常に先頭、以降は初出順
    properties: Vec<(String, Value)>,
}

impl StreamWriter {
    /// 新しい Writer を生成する
    ///
    /// # エラー
    /// - 名前または ID に `,` が含まれる
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Result<Self, CodecError> {
        let name = name.into();
        let id = id.into();
        check_token(&name)?;
        check_token(&id)?;
        Ok(StreamWriter {
            name,
            id,
            properties: vec![(TIME_PROPERTY.to_string(), Value::Number(0.0))],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 現在のスキーマ（プロパティ名の並び）
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    /// サンプルを 1 件書き込む
    ///
    /// # 引数
    /// - `data`: 今回更新するプロパティ（省略したプロパティは前回値のまま送られる）
    /// - `time_ms`: スロットリングウィンドウ開始からの相対時刻
    /// - `edge`: ジェスチャ境界マーカー
    /// - `out`: 追記先のバッファ
    ///
    /// # 戻り値
    /// 追記したトークン数
    ///
    /// # エラー
    /// `,` を含むキー・値があれば何も書かずに `InvalidToken` を返す
    pub fn write<I, K, V>(
        &mut self,
        data: I,
        time_ms: u64,
        edge: Option<EdgeMarker>,
        out: &mut Vec<String>,
    ) -> Result<usize, CodecError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        // 状態を変更する前にすべて検査する
        let mut updates = Vec::new();
        for (key, value) in data {
            let key = key.into();
            let value = value.into();
            check_token(&key)?;
            value.to_token()?;
            updates.push((key, value));
        }

        let mut schema_grew = false;
        for (key, value) in updates {
            match self.properties.iter_mut().find(|(name, _)| *name == key) {
                Some(slot) => slot.1 = value,
                None => {
                    schema_grew = true;
                    self.properties.push((key, value));
                }
            }
        }

        if let Some(slot) = self
            .properties
            .iter_mut()
            .find(|(name, _)| name == TIME_PROPERTY)
        {
            slot.1 = Value::Number(time_ms as f64);
        }

        let start_len = out.len();

        if schema_grew {
            self.write_registration(out);
        }

        out.push(self.id.clone());

        if let Some(edge) = edge {
            out.push(edge.token().to_string());
        }

        for (_, value) in &self.properties {
            out.push(value.to_string());
        }

        Ok(out.len() - start_len)
    }

    /// スキーマ登録ブロックを書き出す（スキーマ全体を毎回再送する）
    fn write_registration(&self, out: &mut Vec<String>) {
        out.push(REGISTER_TAG.to_string());
        out.push(self.name.clone());
        out.push(self.id.clone());
        out.push(self.properties.len().to_string());
        for (name, _) in &self.properties {
            out.push(name.clone());
        }
    }
}
