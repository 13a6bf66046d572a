use serde::{Deserialize, Serialize};

/// The single domain entity: a shortcode bound to a target URL on one shard.
///
/// Field names mirror the wire format already in use on `urls_queue`
/// (`ID`/`Shortcode`/`URL`/`Accesses`) so consumers already speaking that
/// contract keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UrlRecord {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Shortcode")]
    pub shortcode: String,
    #[serde(rename = "URL")]
    pub url: String,
    /// Reserved for future read-path telemetry. No module in this repo
    /// increments it.
    #[serde(rename = "Accesses")]
    pub accesses: i64,
}

impl UrlRecord {
    /// Construct a record as the service layer does: caller-supplied
    /// shortcode and URL, zero id (shard-assigned on insert) and
    /// zero accesses.
    pub fn new(url: impl Into<String>, shortcode: impl Into<String>) -> Self {
        Self {
            id: 0,
            shortcode: shortcode.into(),
            url: url.into(),
            accesses: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_pascal_case_keys() {
        let record = UrlRecord::new("https://example.com", "abc123");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ID"], 0);
        assert_eq!(json["Shortcode"], "abc123");
        assert_eq!(json["URL"], "https://example.com");
        assert_eq!(json["Accesses"], 0);
    }

    #[test]
    fn round_trips_through_json() {
        let record = UrlRecord {
            id: 42,
            shortcode: "abc123".into(),
            url: "https://example.com".into(),
            accesses: 0,
        };
        let json = serde_json::to_string(&record).unwrap();
        let decoded: UrlRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, decoded);
    }
}
