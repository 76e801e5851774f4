//! Small helpers shared by the request, response and stream translators.

use uuid::Uuid;

use crate::messages::{ImageSource, StopReason};

// MARK: - Identifiers

/// Generate a message id for responses the upstream left unnamed.
pub fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

// MARK: - Finish Reason Mapping

/// Map an upstream finish reason onto the Messages stop-reason vocabulary.
/// Unknown reasons map to `None`.
pub fn map_finish_reason(reason: &str) -> Option<StopReason> {
    match reason {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "tool_calls" => Some(StopReason::ToolUse),
        "content_filter" => Some(StopReason::StopSequence),
        _ => None,
    }
}

// MARK: - Image URLs

/// Split a base64 `data:` URI into an inline image source.
///
/// Returns `None` for anything that is not a base64 data URI.
pub fn parse_data_uri(url: &str) -> Option<ImageSource> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    let media_type = if media_type.is_empty() {
        "image/png"
    } else {
        media_type
    };

    Some(ImageSource::Base64 {
        media_type: media_type.to_string(),
        data: data.to_string(),
    })
}

// MARK: - Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_finish_reason() {
        assert_eq!(map_finish_reason("stop"), Some(StopReason::EndTurn));
        assert_eq!(map_finish_reason("length"), Some(StopReason::MaxTokens));
        assert_eq!(map_finish_reason("tool_calls"), Some(StopReason::ToolUse));
        assert_eq!(
            map_finish_reason("content_filter"),
            Some(StopReason::StopSequence)
        );
        assert_eq!(map_finish_reason("function_call"), None);
        assert_eq!(map_finish_reason(""), None);
    }

    #[test]
    fn test_parse_data_uri() {
        assert_eq!(
            parse_data_uri("data:image/webp;base64,UklGRg=="),
            Some(ImageSource::Base64 {
                media_type: "image/webp".to_string(),
                data: "UklGRg==".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_data_uri_defaults_media_type() {
        assert_eq!(
            parse_data_uri("data:;base64,AAAA"),
            Some(ImageSource::Base64 {
                media_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_data_uri_rejects_non_base64() {
        assert_eq!(parse_data_uri("https://example.com/a.png"), None);
        assert_eq!(parse_data_uri("data:text/plain,hello"), None);
        assert_eq!(parse_data_uri("data:image/png;base64"), None);
    }

    #[test]
    fn test_new_message_id_shape() {
        let id = new_message_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(id, new_message_id());
    }
}
