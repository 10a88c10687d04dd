//! `YYYY-MM-DD` on the wire, for `#[serde(with = ...)]`.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serializer, de};

const FORMAT: &str = "%Y-%m-%d";

pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&date.format(FORMAT))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).map_err(de::Error::custom)
}

fn parse(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD date, got {raw:?}: {e}"))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.collect_str(&d.format(FORMAT)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| parse(&raw).map_err(de::Error::custom))
            .transpose()
    }
}
