//! Conversion between [`Paste`] and the stored [`Document`] form.
//!
//! Pastes carry naive timestamps in the server's local time zone; documents carry UTC
//! instants. Both directions go through [`chrono::Local`].

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::{AppError, AppResult};
use crate::models::{Access, Paste};
use crate::store::{Document, Field, Kind, Value};

pub const ID: &str = "id";
pub const TEXT: &str = "text";
pub const ACCESS: &str = "access";
pub const CREATED_AT: &str = "createdAt";
pub const EXPIRE_AT: &str = "expireAt";

/// Column layout of the paste collection, in storage order.
pub const PASTE_SCHEMA: &[Field] = &[
    Field {
        name: ID,
        kind: Kind::Int64,
    },
    Field {
        name: TEXT,
        kind: Kind::String,
    },
    Field {
        name: ACCESS,
        kind: Kind::String,
    },
    Field {
        name: CREATED_AT,
        kind: Kind::Instant,
    },
    Field {
        name: EXPIRE_AT,
        kind: Kind::Instant,
    },
];

pub fn to_document(paste: &Paste) -> Document {
    Document::new()
        .with(ID, paste.id())
        .with(TEXT, paste.text())
        .with(ACCESS, paste.access().as_str())
        .with(CREATED_AT, local_to_utc(paste.created_at()))
        .with(EXPIRE_AT, local_to_utc(paste.expire_at()))
}

/// Decode a stored document. A missing document is "not found", not an error.
pub fn to_paste(document: Option<Document>) -> AppResult<Option<Paste>> {
    let Some(document) = document else {
        return Ok(None);
    };

    let id = match document.get(ID) {
        Some(Value::Int64(id)) => *id,
        _ => return Err(malformed(ID)),
    };
    let text = match document.get(TEXT) {
        Some(Value::String(text)) => text.clone(),
        _ => return Err(malformed(TEXT)),
    };
    let access: Access = match document.get(ACCESS) {
        Some(Value::String(access)) => access
            .parse()
            .map_err(|_| AppError::MalformedDocument(format!("unknown access '{access}'")))?,
        _ => return Err(malformed(ACCESS)),
    };
    let created_at = instant(&document, CREATED_AT)?;
    let expire_at = instant(&document, EXPIRE_AT)?;

    Ok(Some(Paste::from_parts(
        id,
        text,
        access,
        utc_to_local(created_at),
        utc_to_local(expire_at),
    )))
}

pub fn to_pastes(documents: Vec<Document>) -> AppResult<Vec<Paste>> {
    documents
        .into_iter()
        .filter_map(|doc| to_paste(Some(doc)).transpose())
        .collect()
}

/// Interpret a naive local time as an instant.
///
/// Ambiguous times (DST fold) resolve to the earlier instant; times inside a DST gap
/// are shifted by the offset in effect at that wall-clock time.
pub fn local_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = Local.offset_from_utc_datetime(&local).fix();
            Utc.from_utc_datetime(&(local - offset))
        }
    }
}

pub fn utc_to_local(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&Local).naive_local()
}

/// The current local time, as used for creation and expiry comparisons.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

fn instant(document: &Document, field: &str) -> AppResult<DateTime<Utc>> {
    match document.get(field) {
        Some(Value::Instant(t)) => Ok(*t),
        _ => Err(malformed(field)),
    }
}

fn malformed(field: &str) -> AppError {
    AppError::MalformedDocument(format!("missing or mistyped '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::HashIdGenerator;
    use crate::models::tests::{at, request};

    #[test]
    fn encode_then_decode_is_identity() {
        for (access, validity) in [("public", 600), ("UNLISTED", 0)] {
            let paste = Paste::from_request_at(
                request("round trip", access, validity),
                at(9, 15, 30),
                &HashIdGenerator,
            )
            .unwrap();
            let decoded = to_paste(Some(to_document(&paste))).unwrap();
            assert_eq!(decoded, Some(paste));
        }
    }

    #[test]
    fn document_has_canonical_schema() {
        let paste =
            Paste::from_request_at(request("x", "unlisted", 1), at(0, 0, 0), &HashIdGenerator)
                .unwrap();
        let doc = to_document(&paste);
        let names: Vec<_> = doc.fields().map(|(n, _)| n).collect();
        let expected: Vec<_> = PASTE_SCHEMA.iter().map(|f| f.name).collect();
        assert_eq!(names, expected);
        assert_eq!(doc.get(ACCESS), Some(&Value::from("UNLISTED")));
        assert_eq!(
            doc.get(CREATED_AT),
            Some(&Value::Instant(local_to_utc(paste.created_at())))
        );
    }

    #[test]
    fn missing_document_is_not_found() {
        assert_eq!(to_paste(None).unwrap(), None);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let doc = Document::new().with(ID, 1i64).with(TEXT, "x");
        assert!(matches!(
            to_paste(Some(doc)),
            Err(AppError::MalformedDocument(_))
        ));

        let doc = Document::new()
            .with(ID, 1i64)
            .with(TEXT, "x")
            .with(ACCESS, "secret")
            .with(CREATED_AT, Utc::now())
            .with(EXPIRE_AT, Utc::now());
        assert!(matches!(
            to_paste(Some(doc)),
            Err(AppError::MalformedDocument(_))
        ));
    }

    #[test]
    fn local_conversion_roundtrips() {
        let local = at(14, 0, 0);
        assert_eq!(utc_to_local(local_to_utc(local)), local);
    }
}
