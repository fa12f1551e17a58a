//! Proposition Feed Adapters - Table Retrieval
//!
//! Implements `PropositionSource` for:
//! - `FileSource`: JSON table on local disk
//! - `HttpSource`: JSON table behind an HTTP endpoint (rate limited, retried)
//!
//! Both accept either a bare JSON array of records or an object with a
//! `propositions` array. Records are read one at a time; a record that
//! cannot be read is handed on as a malformed placeholder so pricing can
//! list it as an exclusion.

pub mod file;
pub mod http;

pub use file::FileSource;
pub use http::{HttpSource, HttpSourceConfig};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::domain::proposition::RawProposition;

#[derive(Deserialize)]
#[serde(untagged)]
enum TableDocument {
    Bare(Vec<Value>),
    Wrapped { propositions: Vec<Value> },
}

/// Parse a proposition table document.
///
/// Fails only when the document itself is unreadable. Every record is
/// returned in table order, unreadable ones as
/// [`RawProposition::malformed`].
pub fn parse_table(text: &str) -> Result<Vec<RawProposition>> {
    let document: TableDocument =
        serde_json::from_str(text.trim()).context("Failed to parse proposition table")?;
    let rows = match document {
        TableDocument::Bare(rows) => rows,
        TableDocument::Wrapped { propositions } => propositions,
    };
    Ok(rows.into_iter().enumerate().map(|(row, value)| parse_record(row, value)).collect())
}

fn parse_record(row: usize, value: Value) -> RawProposition {
    match RawProposition::deserialize(&value) {
        Ok(record) => record,
        Err(e) => {
            warn!(row, error = %e, "Malformed proposition record");
            let text = |key: &str| {
                value
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            RawProposition::malformed(text("player"), text("market"), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let rows = parse_table(
            r#"[{"player":"L. Doncic","team":"DAL","market":"Assists","line":8.5,
                "price_favorable":-125,"price_unfavorable":105,"group":"DAL@PHX"}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price_unfavorable, Some(105));
    }

    #[test]
    fn test_parse_wrapped_document() {
        let rows = parse_table(
            r#"{"propositions":[{"player":"N. Jokic","market":"Rebounds","line":12.5,
                "over_odds":-105}]}"#,
        )
        .unwrap();
        assert_eq!(rows[0].price_favorable, Some(-105));
        assert_eq!(rows[0].price_unfavorable, None);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_table("<html>403</html>").is_err());
    }

    #[test]
    fn test_mixed_table_keeps_good_rows() {
        let rows = parse_table(
            r#"[
                {"player":"A","market":"Points","line":24.5,"over_odds":-120,"under_odds":100},
                {"player":"B","market":"Points","line":"18.5","over_odds":-110,"under_odds":-110},
                {"player":"C","market":"Points","over_odds":-110,"under_odds":-110},
                {"player":"D","market":"Points","line":7.5,"over_odds":-120.0,"under_odds":100},
                {"player":"E","market":"Points","line":"abc","over_odds":-110,"under_odds":-110},
                "not a record"
            ]"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].line, Some(24.5));
        assert_eq!(rows[1].line, Some(18.5));
        assert_eq!(rows[2].line, None);
        assert!(rows[2].malformed.is_none());
        assert_eq!(rows[3].price_favorable, Some(-120));
        assert!(rows[..4].iter().all(|r| r.malformed.is_none()));

        assert_eq!(rows[4].player, "E");
        assert_eq!(rows[4].market, "Points");
        assert!(rows[4].malformed.is_some());
        assert_eq!(rows[5].player, "");
        assert!(rows[5].malformed.is_some());
    }
}
