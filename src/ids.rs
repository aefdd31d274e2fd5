use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use uuid::Uuid;

/// Derives the numeric id of a new paste.
pub trait IdGenerator {
    fn generate(&self, text: &str, created_at: NaiveDateTime) -> i64;
}

/// Content-derived ids: `31 * hash(text) + 31 * hash(created_at)`.
///
/// Not unique. Identical text created within the same second maps to the same id.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIdGenerator;

impl IdGenerator for HashIdGenerator {
    fn generate(&self, text: &str, created_at: NaiveDateTime) -> i64 {
        let text_hash = i64::from(text_hash(text));
        let time_hash = i64::from(timestamp_hash(created_at));
        31i64
            .wrapping_mul(text_hash)
            .wrapping_add(31i64.wrapping_mul(time_hash))
    }
}

/// Random non-negative ids backed by v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, _text: &str, _created_at: NaiveDateTime) -> i64 {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        (high & i64::MAX as u64) as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    #[default]
    Hash,
    Random,
}

#[derive(Debug, Clone, Copy)]
pub enum AnyIdGenerator {
    Hash(HashIdGenerator),
    Random(RandomIdGenerator),
}

impl AnyIdGenerator {
    pub fn for_scheme(scheme: IdScheme) -> Self {
        match scheme {
            IdScheme::Hash => AnyIdGenerator::Hash(HashIdGenerator),
            IdScheme::Random => AnyIdGenerator::Random(RandomIdGenerator),
        }
    }
}

impl IdGenerator for AnyIdGenerator {
    fn generate(&self, text: &str, created_at: NaiveDateTime) -> i64 {
        match self {
            AnyIdGenerator::Hash(ids) => ids.generate(text, created_at),
            AnyIdGenerator::Random(ids) => ids.generate(text, created_at),
        }
    }
}

/// 31-polynomial over UTF-16 code units, wrapping at 32 bits.
fn text_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn timestamp_hash(time: NaiveDateTime) -> i32 {
    let year = time.year();
    let month = time.month() as i32;
    let day = time.day() as i32;
    let date_hash = (year & 0xFFFF_F800u32 as i32)
        ^ (year
            .wrapping_shl(11)
            .wrapping_add(month << 6)
            .wrapping_add(day));

    let nanos_of_day = i64::from(time.num_seconds_from_midnight()) * 1_000_000_000
        + i64::from(time.nanosecond());
    let time_hash = (nanos_of_day ^ ((nanos_of_day as u64) >> 32) as i64) as i32;

    date_hash ^ time_hash
}
