use crate::errors::{Result, TourError, ValidationErrors};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_with::skip_serializing_none;
use std::fmt;
use ulid::Ulid;

pub type TourId = String; // ULID string

pub const NAME_MIN_CHARS: usize = 10;
pub const NAME_MAX_CHARS: usize = 40;
pub const DEFAULT_RATING_AVERAGE: f64 = 4.5;
pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 5.0;

/// Checks that `raw` is a well-formed tour identifier.
pub fn parse_tour_id(raw: &str) -> Result<TourId> {
    Ulid::from_string(raw.trim())
        .map(|u| u.to_string())
        .map_err(|_| TourError::InvalidId(raw.to_string()))
}

pub fn new_tour_id() -> TourId {
    Ulid::new().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "difficult" => Some(Difficulty::Difficult),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted tour. Numbers are stored as `f64` and written back as
/// integers when they have no fractional part.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: TourId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(with = "num")]
    pub duration: f64,
    #[serde(with = "num")]
    pub max_group_size: f64,
    pub difficulty: Difficulty,
    #[serde(with = "num")]
    pub rating_average: f64,
    #[serde(with = "num")]
    pub rating_quantity: f64,
    #[serde(with = "num")]
    pub price: f64,
    #[serde(default, with = "num::opt")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
}

/// Request body for create and update. Values are kept as raw JSON and cast
/// per field so every bad field is reported, not just the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourInput {
    pub name: Option<JsonValue>,
    pub slug: Option<JsonValue>,
    pub duration: Option<JsonValue>,
    pub max_group_size: Option<JsonValue>,
    pub difficulty: Option<JsonValue>,
    pub rating_average: Option<JsonValue>,
    pub rating_quantity: Option<JsonValue>,
    pub price: Option<JsonValue>,
    pub price_discount: Option<JsonValue>,
    pub summary: Option<JsonValue>,
    pub description: Option<JsonValue>,
    pub image_cover: Option<JsonValue>,
    pub images: Option<JsonValue>,
    pub created_at: Option<JsonValue>,
    pub start_dates: Option<JsonValue>,
}

impl TourInput {
    /// Accepts only JSON objects; unknown keys are ignored.
    pub fn from_json(body: JsonValue) -> Result<Self> {
        if !body.is_object() {
            return Err(TourError::InvalidBody(
                "request body must be a JSON object".into(),
            ));
        }
        serde_json::from_value(body).map_err(|e| TourError::InvalidBody(e.to_string()))
    }
}

/// Field types as seen by the store when casting filter literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Id,
    Number,
    Text,
    Timestamp,
    TextList,
    TimestampList,
}

/// Borrowed view of one field's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Null,
    Number(f64),
    Text(&'a str),
    Timestamp(DateTime<Utc>),
    Texts(&'a [String]),
    Timestamps(&'a [DateTime<Utc>]),
}

impl Tour {
    pub fn field_type(name: &str) -> Option<FieldType> {
        Some(match name {
            "id" => FieldType::Id,
            "duration" | "maxGroupSize" | "ratingAverage" | "ratingQuantity" | "price"
            | "priceDiscount" => FieldType::Number,
            "name" | "slug" | "difficulty" | "summary" | "description" | "imageCover" => {
                FieldType::Text
            }
            "createdAt" => FieldType::Timestamp,
            "images" => FieldType::TextList,
            "startDates" => FieldType::TimestampList,
            _ => return None,
        })
    }

    /// Returns `None` for fields that are not part of the schema.
    pub fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        Some(match name {
            "id" => FieldRef::Text(&self.id),
            "name" => FieldRef::Text(&self.name),
            "slug" => self.slug.as_deref().map_or(FieldRef::Null, FieldRef::Text),
            "duration" => FieldRef::Number(self.duration),
            "maxGroupSize" => FieldRef::Number(self.max_group_size),
            "difficulty" => FieldRef::Text(self.difficulty.as_str()),
            "ratingAverage" => FieldRef::Number(self.rating_average),
            "ratingQuantity" => FieldRef::Number(self.rating_quantity),
            "price" => FieldRef::Number(self.price),
            "priceDiscount" => self.price_discount.map_or(FieldRef::Null, FieldRef::Number),
            "summary" => FieldRef::Text(&self.summary),
            "description" => self
                .description
                .as_deref()
                .map_or(FieldRef::Null, FieldRef::Text),
            "imageCover" => FieldRef::Text(&self.image_cover),
            "images" => FieldRef::Texts(&self.images),
            "createdAt" => FieldRef::Timestamp(self.created_at),
            "startDates" => FieldRef::Timestamps(&self.start_dates),
            _ => return None,
        })
    }

    /// Builds a new tour from a create body: defaults, casting, validation.
    pub fn from_input(id: TourId, input: TourInput, now: DateTime<Utc>) -> Result<Tour> {
        let mut draft = Draft::default();
        let mut errs = ValidationErrors::default();
        draft.apply(&input, &mut errs, true);
        draft.finish(id, now, errs)
    }

    /// Merges a partial update into this tour and re-validates the result.
    /// `id` and `createdAt` never change.
    pub fn apply_patch(&self, patch: &TourInput) -> Result<Tour> {
        let mut draft = Draft::from_tour(self);
        let mut errs = ValidationErrors::default();
        draft.apply(patch, &mut errs, false);
        draft.finish(self.id.clone(), self.created_at, errs)
    }

    pub fn to_document(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

#[derive(Default)]
struct Draft {
    name: Option<String>,
    slug: Option<String>,
    duration: Option<f64>,
    max_group_size: Option<f64>,
    difficulty: Option<Difficulty>,
    rating_average: Option<f64>,
    rating_quantity: Option<f64>,
    price: Option<f64>,
    price_discount: Option<f64>,
    summary: Option<String>,
    description: Option<String>,
    image_cover: Option<String>,
    images: Vec<String>,
    created_at: Option<DateTime<Utc>>,
    start_dates: Vec<DateTime<Utc>>,
}

impl Draft {
    fn from_tour(t: &Tour) -> Self {
        Self {
            name: Some(t.name.clone()),
            slug: t.slug.clone(),
            duration: Some(t.duration),
            max_group_size: Some(t.max_group_size),
            difficulty: Some(t.difficulty),
            rating_average: Some(t.rating_average),
            rating_quantity: Some(t.rating_quantity),
            price: Some(t.price),
            price_discount: t.price_discount,
            summary: Some(t.summary.clone()),
            description: t.description.clone(),
            image_cover: Some(t.image_cover.clone()),
            images: t.images.clone(),
            created_at: Some(t.created_at),
            start_dates: t.start_dates.clone(),
        }
    }

    fn apply(&mut self, input: &TourInput, errs: &mut ValidationErrors, creating: bool) {
        set(&mut self.name, &input.name, |v| cast_text(v, true), "name", "String", errs);
        set(&mut self.slug, &input.slug, |v| cast_text(v, false), "slug", "String", errs);
        set(&mut self.duration, &input.duration, cast_number, "duration", "Number", errs);
        set(
            &mut self.max_group_size,
            &input.max_group_size,
            cast_number,
            "maxGroupSize",
            "Number",
            errs,
        );
        if let Some(v) = &input.difficulty {
            if v.is_null() {
                self.difficulty = None;
            } else {
                match cast_text(v, false).as_deref().and_then(Difficulty::parse) {
                    Some(d) => self.difficulty = Some(d),
                    None => errs.add("difficulty", "Difficulty is either: easy, medium, difficult"),
                }
            }
        }
        set(
            &mut self.rating_average,
            &input.rating_average,
            cast_number,
            "ratingAverage",
            "Number",
            errs,
        );
        set(
            &mut self.rating_quantity,
            &input.rating_quantity,
            cast_number,
            "ratingQuantity",
            "Number",
            errs,
        );
        set(&mut self.price, &input.price, cast_number, "price", "Number", errs);
        set(
            &mut self.price_discount,
            &input.price_discount,
            cast_number,
            "priceDiscount",
            "Number",
            errs,
        );
        set(&mut self.summary, &input.summary, |v| cast_text(v, true), "summary", "String", errs);
        set(
            &mut self.description,
            &input.description,
            |v| cast_text(v, true),
            "description",
            "String",
            errs,
        );
        set(
            &mut self.image_cover,
            &input.image_cover,
            |v| cast_text(v, false),
            "imageCover",
            "String",
            errs,
        );
        if let Some(v) = &input.images {
            match cast_list(v, |x| cast_text(x, false)) {
                Some(list) => self.images = list,
                None => errs.add("images", cast_message("[String]", v)),
            }
        }
        if let Some(v) = &input.start_dates {
            match cast_list(v, cast_timestamp) {
                Some(list) => self.start_dates = list,
                None => errs.add("startDates", cast_message("[Date]", v)),
            }
        }
        // createdAt is immutable once set
        if creating {
            set(
                &mut self.created_at,
                &input.created_at,
                cast_timestamp,
                "createdAt",
                "Date",
                errs,
            );
        }
    }

    fn finish(
        self,
        id: TourId,
        now: DateTime<Utc>,
        mut errs: ValidationErrors,
    ) -> Result<Tour> {
        let name = required(self.name, "name", "A tour must have a name!", &mut errs);
        let duration = required(self.duration, "duration", "A tour must have a duration", &mut errs);
        let max_group_size = required(
            self.max_group_size,
            "maxGroupSize",
            "A tour must have a group size",
            &mut errs,
        );
        let difficulty = required(
            self.difficulty,
            "difficulty",
            "A tour must have a difficulty",
            &mut errs,
        );
        let price = required(self.price, "price", "A tour must have a price", &mut errs);
        let summary = required(self.summary, "summary", "A tour must have a summary", &mut errs);
        let image_cover = required(
            self.image_cover,
            "imageCover",
            "A tour must have a cover image",
            &mut errs,
        );
        let (
            Some(name),
            Some(duration),
            Some(max_group_size),
            Some(difficulty),
            Some(price),
            Some(summary),
            Some(image_cover),
        ) = (
            name,
            duration,
            max_group_size,
            difficulty,
            price,
            summary,
            image_cover,
        )
        else {
            return Err(TourError::Validation(errs));
        };
        let tour = Tour {
            id,
            name,
            slug: self.slug,
            duration,
            max_group_size,
            difficulty,
            rating_average: self.rating_average.unwrap_or(DEFAULT_RATING_AVERAGE),
            rating_quantity: self.rating_quantity.unwrap_or(0.0),
            price,
            price_discount: self.price_discount,
            summary,
            description: self.description,
            image_cover,
            images: self.images,
            created_at: self.created_at.unwrap_or(now),
            start_dates: self.start_dates,
        };
        check_constraints(&tour, &mut errs);
        errs.into_result()?;
        Ok(tour)
    }
}

fn check_constraints(t: &Tour, errs: &mut ValidationErrors) {
    let len = t.name.chars().count();
    if len > NAME_MAX_CHARS {
        errs.add(
            "name",
            format!("A tour name must have less or equal to {NAME_MAX_CHARS} characters"),
        );
    } else if len < NAME_MIN_CHARS {
        errs.add(
            "name",
            format!("A tour name must have more or equal than {NAME_MIN_CHARS} characters"),
        );
    }
    if t.rating_average < RATING_MIN {
        errs.add("ratingAverage", "rating must be above 1.0");
    } else if t.rating_average > RATING_MAX {
        errs.add("ratingAverage", "rating must be below 5.0");
    }
}

fn required<T>(
    value: Option<T>,
    field: &str,
    message: &str,
    errs: &mut ValidationErrors,
) -> Option<T> {
    if value.is_none() {
        errs.add(field, message);
    }
    value
}

// Absent keeps the current value, null clears it, anything else is cast.
fn set<T>(
    slot: &mut Option<T>,
    raw: &Option<JsonValue>,
    cast: impl Fn(&JsonValue) -> Option<T>,
    field: &str,
    type_name: &str,
    errs: &mut ValidationErrors,
) {
    match raw {
        None => {}
        Some(JsonValue::Null) => *slot = None,
        Some(v) => match cast(v) {
            Some(x) => *slot = Some(x),
            None => errs.add(field, cast_message(type_name, v)),
        },
    }
}

fn cast_message(type_name: &str, v: &JsonValue) -> String {
    format!("Cast to {type_name} failed for value {v}")
}

fn cast_number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parses a numeric literal the way the store casts query and body strings.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn cast_text(v: &JsonValue, trim: bool) -> Option<String> {
    let s = match v {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(if trim { s.trim().to_string() } else { s })
}

fn cast_timestamp(v: &JsonValue) -> Option<DateTime<Utc>> {
    match v {
        JsonValue::String(s) => parse_timestamp(s),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn cast_list<T>(v: &JsonValue, cast: impl Fn(&JsonValue) -> Option<T>) -> Option<Vec<T>> {
    match v {
        JsonValue::Array(items) => items.iter().map(&cast).collect(),
        JsonValue::Null => Some(Vec::new()),
        single => cast(single).map(|x| vec![x]),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` and the
/// `YYYY-MM-DD,HH:MM` form used by the bundled dev data. Naive values are UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d,%H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// Whole numbers are written as JSON integers.
mod num {
    use serde::{Deserialize, Deserializer, Serializer};

    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.fract() == 0.0 && v.abs() < MAX_EXACT {
            s.serialize_i64(*v as i64)
        } else {
            s.serialize_f64(*v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        f64::deserialize(d)
    }

    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(x) => super::serialize(x, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
            Option::<f64>::deserialize(d)
        }
    }
}
