//! Milvus REST error mapping onto the store error taxonomy.

use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// The canonical message surfaced verbatim when the account-level collection
/// ceiling is hit.
pub const COLLECTION_LIMIT_MESSAGE: &str =
    "exceeded the limit number of collections";

/// Map a transport failure for a named store operation.
pub fn transport_error(operation: &'static str, error: &reqwest::Error) -> ErrorEnvelope {
    let class = if error.is_timeout() || error.is_connect() {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", "connect"),
        format!("milvus {operation} failed: {error}"),
        class,
    )
    .with_metadata("operation", operation)
}

/// Map a non-zero Milvus response code for a named store operation.
pub fn response_error(operation: &'static str, code: i64, message: &str) -> ErrorEnvelope {
    if message.to_ascii_lowercase().contains("limit") && message.to_ascii_lowercase().contains("collection") {
        return ErrorEnvelope::expected(
            ErrorCode::collection_limit_reached(),
            COLLECTION_LIMIT_MESSAGE,
        )
        .with_metadata("backendMessage", message.to_owned());
    }

    let kind = match operation {
        "create_collection" | "drop_collection" => "schema",
        "insert" => "insert",
        "query" | "delete" => "query",
        "search" | "hybrid_search" => "search",
        _ => "query",
    };
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", kind),
        format!("milvus {operation} returned code {code}: {message}"),
        ErrorClass::NonRetriable,
    )
    .with_metadata("operation", operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_limit_messages_map_to_the_canonical_error() {
        let error = response_error(
            "create_collection",
            1100,
            "collection number (100) exceeded the limit for this account",
        );
        assert_eq!(error.code, ErrorCode::collection_limit_reached());
        assert_eq!(error.message, COLLECTION_LIMIT_MESSAGE);
    }

    #[test]
    fn operation_selects_the_store_subkind() {
        assert_eq!(
            response_error("insert", 1, "boom").code,
            ErrorCode::new("store", "insert")
        );
        assert_eq!(
            response_error("search", 1, "boom").code,
            ErrorCode::new("store", "search")
        );
        assert_eq!(
            response_error("create_collection", 1, "boom").code,
            ErrorCode::new("store", "schema")
        );
    }
}
