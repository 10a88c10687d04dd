use serde::Serialize;

use crate::error::{Error, Result};

/// Turns a document into the request body. Runs before the gate, so a
/// failure here never costs an admission.
pub trait Encoder<D: ?Sized>: Send + Sync {
    fn content_type(&self) -> &str;
    fn encode(&self, document: &D) -> Result<Vec<u8>>;
}

/// Compact JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl<D: Serialize + ?Sized> Encoder<D> for JsonEncoder {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, document: &D) -> Result<Vec<u8>> {
        serde_json::to_vec(document).map_err(|e| Error::Serialization(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use std::collections::BTreeMap;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("field cannot be represented"))
        }
    }

    #[test]
    fn encodes_compact_json() {
        let mut doc = BTreeMap::new();
        doc.insert("doc_id", "42");
        doc.insert("doc_type", "LP_INTRODUCE_GOODS");
        let bytes = JsonEncoder.encode(&doc).unwrap();
        assert_eq!(
            bytes,
            br#"{"doc_id":"42","doc_type":"LP_INTRODUCE_GOODS"}"#.to_vec()
        );
    }

    #[test]
    fn failure_maps_to_serialization_error() {
        let err = JsonEncoder.encode(&Unencodable).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("field cannot be represented"));
    }
}
