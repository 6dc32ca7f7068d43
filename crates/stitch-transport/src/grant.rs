//! トークン発行レスポンスの解釈

use serde::Deserialize;

use crate::error::TransportError;

/// サーバーから払い出された接続情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// セッションキー（ホストがキーなしで接続した場合はサーバーが生成）
    pub key: String,
    /// チャンネルを開くためのトークン
    pub token: String,
    /// メッセージの POST 先
    pub endpoint: String,
    /// クライアント ID（送信 Body の `f=` に載せる）
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GrantResponse {
    key: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
    id: Option<String>,
    error: Option<String>,
}

impl TokenGrant {
    /// レスポンス Body（JSON）を解釈する
    ///
    /// # エラー
    /// - `error` フィールドがある → `Rejected`
    /// - JSON として読めない、必須フィールドがない → `InvalidGrant`
    pub fn parse(body: &str) -> Result<Self, TransportError> {
        let response: GrantResponse = serde_json::from_str(body)
            .map_err(|e| TransportError::InvalidGrant(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(TransportError::Rejected(error));
        }

        let missing = |field: &str| TransportError::InvalidGrant(format!("missing field `{}`", field));

        Ok(TokenGrant {
            key: response.key.ok_or_else(|| missing("key"))?,
            token: response.token.ok_or_else(|| missing("token"))?,
            endpoint: response.endpoint.ok_or_else(|| missing("endpoint"))?,
            id: response.id.filter(|id| !id.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_grant() {
        let grant = TokenGrant::parse(
            r#"{"key":"4821","token":"tok-abc","endpoint":"/message/4821","id":"48211"}"#,
        )
        .unwrap();
        assert_eq!(grant.key, "4821");
        assert_eq!(grant.token, "tok-abc");
        assert_eq!(grant.endpoint, "/message/4821");
        assert_eq!(grant.id.as_deref(), Some("48211"));
    }

    #[test]
    fn test_parse_without_id() {
        let grant =
            TokenGrant::parse(r#"{"key":"1000","token":"t","endpoint":"/message/1000"}"#).unwrap();
        assert_eq!(grant.id, None);
    }

    #[test]
    fn test_parse_server_error() {
        assert_eq!(
            TokenGrant::parse(r#"{"error":"key already connected"}"#),
            Err(TransportError::Rejected("key already connected".into()))
        );
    }

    #[test]
    fn test_parse_missing_token() {
        let err = TokenGrant::parse(r#"{"key":"1000","endpoint":"/m"}"#).unwrap_err();
        assert_eq!(err, TransportError::InvalidGrant("missing field `token`".into()));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(
            TokenGrant::parse("<html>oops</html>"),
            Err(TransportError::InvalidGrant(_))
        ));
    }
}
