//! 連続ストリームフレームのエンコード / 分解
//!
//! ## Wire Format
//! ```text
//! [startTimeMs,durationMs,token,token,...]
//! ```
//!
//! 旧形式（閉じ括弧なしで末尾がカンマ `[a,b,c,`）も受理する。

use crate::error::CodecError;

/// フレームヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 送信側の時計でのウィンドウ開始時刻（ミリ秒）
    pub start_ms: u64,
    /// ウィンドウの長さ（最初の書き込みから最後の書き込みまで）
    pub duration_ms: u64,
}

/// 分解済みフレーム（トークンは元のメッセージを借用する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub header: FrameHeader,
    pub tokens: Vec<&'a str>,
}

/// バッファのトークン列をフレーム文字列にする
pub fn encode_frame(header: FrameHeader, tokens: &[String]) -> String {
    let body_len: usize = tokens.iter().map(|t| t.len() + 1).sum();
    let mut frame = String::with_capacity(body_len + 32);

    frame.push('[');
    frame.push_str(&header.start_ms.to_string());
    frame.push(',');
    frame.push_str(&header.duration_ms.to_string());
    for token in tokens {
        frame.push(',');
        frame.push_str(token);
    }
    frame.push(']');

    frame
}

/// フレーム文字列をヘッダーとトークン列に分解する
///
/// # エラー
/// - `[` で始まらない
/// - ヘッダーの 2 トークンが整数として読めない
pub fn split_frame(message: &str) -> Result<DecodedFrame<'_>, CodecError> {
    let inner = message.strip_prefix('[').ok_or(CodecError::NotAFrame)?;
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    let inner = inner.strip_suffix(',').unwrap_or(inner);

    let mut parts = inner.split(',');
    let mut header_field = || {
        let token = parts.next().unwrap_or("");
        token
            .trim()
            .parse::<u64>()
            .map_err(|_| CodecError::InvalidHeader(token.to_string()))
    };
    let start_ms = header_field()?;
    let duration_ms = header_field()?;

    Ok(DecodedFrame {
        header: FrameHeader {
            start_ms,
            duration_ms,
        },
        tokens: parts.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_encode_frame() {
        let header = FrameHeader {
            start_ms: 1_700_000_000_000,
            duration_ms: 50,
        };
        let frame = encode_frame(header, &strings(&["g0", "0", "1"]));
        assert_eq!(frame, "[1700000000000,50,g0,0,1]");
    }

    #[test]
    fn test_split_frame() {
        let frame = split_frame("[1000,50,g0,0,1,2]").unwrap();
        assert_eq!(frame.header.start_ms, 1000);
        assert_eq!(frame.header.duration_ms, 50);
        assert_eq!(frame.tokens, ["g0", "0", "1", "2"]);
    }

    #[test]
    fn test_split_legacy_trailing_comma() {
        let frame = split_frame("[1000,0,g0,0,1,").unwrap();
        assert_eq!(frame.tokens, ["g0", "0", "1"]);

        let frame = split_frame("[1000,0,g0,0,1,]").unwrap();
        assert_eq!(frame.tokens, ["g0", "0", "1"]);
    }

    #[test]
    fn test_split_header_only() {
        let frame = split_frame("[5,0]").unwrap();
        assert!(frame.tokens.is_empty());
    }

    #[test]
    fn test_split_rejects_bad_input() {
        assert_eq!(split_frame("connected"), Err(CodecError::NotAFrame));
        assert_eq!(
            split_frame("[abc,0,g0]"),
            Err(CodecError::InvalidHeader("abc".into()))
        );
        assert_eq!(split_frame("[10]"), Err(CodecError::InvalidHeader("".into())));
    }
}
