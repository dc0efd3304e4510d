//! Translation of request query parameters into store queries.
//!
//! Query strings use bracket syntax for operators, so
//! `duration[gte]=5&difficulty=easy` arrives as
//! `{duration: {gte: "5"}, difficulty: "easy"}` and leaves as the store filter
//! `{duration: {$gte: "5"}, difficulty: "easy"}`. Literals are never coerced
//! here; the store casts them against the field type.

use crate::errors::{Result, TourError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Keys that steer the query instead of filtering documents.
pub const CONTROL_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_SORT_FIELD: &str = "createdAt";
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Raw query mapping as produced by [`nest_query_pairs`].
pub type RawQuery = Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "$gte")]
    Gte,
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$lte")]
    Lte,
    #[serde(rename = "$lt")]
    Lt,
}

impl CmpOp {
    /// Maps a request suffix (`gte`) to its operator.
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(CmpOp::Gte),
            "gt" => Some(CmpOp::Gt),
            "lte" => Some(CmpOp::Lte),
            "lt" => Some(CmpOp::Lt),
            _ => None,
        }
    }

    pub fn holds(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Gte => ord != Less,
            CmpOp::Gt => ord == Greater,
            CmpOp::Lte => ord != Greater,
            CmpOp::Lt => ord == Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Eq(String),
    Cmp(BTreeMap<CmpOp, String>),
}

/// Store-level data filter; empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter(pub BTreeMap<String, Condition>);

impl Filter {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: Order,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: Order::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: Order::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

/// Which document fields to return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Everything except `createdAt`.
    #[default]
    Default,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn apply(&self, doc: JsonValue) -> JsonValue {
        let JsonValue::Object(mut map) = doc else {
            return doc;
        };
        match self {
            Projection::Default => {
                map.remove(DEFAULT_SORT_FIELD);
            }
            Projection::Include(fields) => {
                let keep_id = !fields.iter().any(|f| f == "-id");
                map.retain(|k, _| (keep_id && k == "id") || fields.iter().any(|f| f == k));
            }
            Projection::Exclude(fields) => {
                map.remove(DEFAULT_SORT_FIELD);
                for f in fields {
                    map.remove(f);
                }
            }
        }
        JsonValue::Object(map)
    }
}

/// Fully translated list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub page: Option<Page>,
    pub projection: Projection,
}

impl Default for TourQuery {
    fn default() -> Self {
        Self {
            filter: Filter::match_all(),
            sort: vec![SortKey::desc(DEFAULT_SORT_FIELD)],
            page: None,
            projection: Projection::Default,
        }
    }
}

impl TourQuery {
    /// Translates a raw query mapping. Nothing is applied on failure.
    pub fn translate(raw: &RawQuery) -> Result<Self> {
        let mut filter = Filter::match_all();
        for (key, value) in raw.iter() {
            if CONTROL_KEYS.contains(&key.as_str()) {
                continue;
            }
            filter.0.insert(key.clone(), translate_condition(key, value)?);
        }
        let sort = match control_text(raw, "sort")? {
            Some(s) => parse_sort(s),
            None => Vec::new(),
        };
        let sort = if sort.is_empty() {
            vec![SortKey::desc(DEFAULT_SORT_FIELD)]
        } else {
            sort
        };
        let page = parse_page(
            control_positive(raw, "page")?,
            control_positive(raw, "limit")?,
        );
        let projection = match control_text(raw, "fields")? {
            Some(s) => parse_projection(s)?,
            None => Projection::Default,
        };
        Ok(Self {
            filter,
            sort,
            page,
            projection,
        })
    }
}

fn translate_condition(key: &str, value: &JsonValue) -> Result<Condition> {
    match value {
        JsonValue::String(s) => Ok(Condition::Eq(s.clone())),
        JsonValue::Object(ops) => {
            let mut out = BTreeMap::new();
            for (suffix, literal) in ops.iter() {
                let op = CmpOp::from_suffix(suffix).ok_or_else(|| {
                    TourError::MalformedFilter(format!(
                        "unsupported operator {suffix:?} on field {key:?}"
                    ))
                })?;
                let JsonValue::String(lit) = literal else {
                    return Err(TourError::MalformedFilter(format!(
                        "value of {key}[{suffix}] must be a string"
                    )));
                };
                out.insert(op, lit.clone());
            }
            if out.is_empty() {
                return Err(TourError::MalformedFilter(format!(
                    "empty operator mapping on field {key:?}"
                )));
            }
            Ok(Condition::Cmp(out))
        }
        _ => Err(TourError::MalformedFilter(format!(
            "value of {key:?} must be a string or an operator mapping"
        ))),
    }
}

fn control_text<'a>(raw: &'a RawQuery, key: &str) -> Result<Option<&'a str>> {
    match raw.get(key) {
        None => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(TourError::MalformedFilter(format!("{key} must be a string"))),
    }
}

fn control_positive(raw: &RawQuery, key: &str) -> Result<Option<usize>> {
    let Some(s) = control_text(raw, key)? else {
        return Ok(None);
    };
    match s.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(TourError::MalformedFilter(format!(
            "{key} must be a positive integer"
        ))),
    }
}

/// `-price,name` sorts by price descending, then name ascending.
pub fn parse_sort(s: &str) -> Vec<SortKey> {
    s.split(',')
        .map(str::trim)
        .filter_map(|part| match part.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(SortKey::desc(field)),
            Some(_) => None,
            None if !part.is_empty() => Some(SortKey::asc(part)),
            None => None,
        })
        .collect()
}

fn parse_page(page: Option<usize>, limit: Option<usize>) -> Option<Page> {
    match (page, limit) {
        (None, None) => None,
        (page, limit) => {
            let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
            let page = page.unwrap_or(1);
            Some(Page {
                skip: (page - 1).saturating_mul(limit),
                limit,
            })
        }
    }
}

fn parse_projection(s: &str) -> Result<Projection> {
    let parts: Vec<&str> = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "-")
        .collect();
    if parts.is_empty() {
        return Ok(Projection::Default);
    }
    let excluded = parts.iter().filter(|p| p.starts_with('-')).count();
    if excluded == parts.len() {
        return Ok(Projection::Exclude(
            parts
                .iter()
                .map(|p| p.trim_start_matches('-').to_string())
                .collect(),
        ));
    }
    // `-id` is the one exclusion allowed next to inclusions
    let mixed = parts
        .iter()
        .any(|p| p.starts_with('-') && *p != "-id");
    if mixed {
        return Err(TourError::MalformedFilter(
            "fields cannot mix inclusion and exclusion".into(),
        ));
    }
    Ok(Projection::Include(
        parts.iter().map(|p| p.to_string()).collect(),
    ))
}

/// Folds decoded `key=value` pairs into the nested mapping that
/// [`TourQuery::translate`] consumes: `a[b]=1` nests, `a[]=1` and repeated
/// keys become arrays.
pub fn nest_query_pairs<I>(pairs: I) -> RawQuery
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut out = RawQuery::new();
    for (key, value) in pairs {
        let (base, path) = split_brackets(&key);
        let mut leaf = JsonValue::String(value);
        let mut array_leaf = false;
        for (i, seg) in path.iter().enumerate().rev() {
            if seg.is_empty() && i == path.len() - 1 {
                array_leaf = true;
                continue;
            }
            let mut m = Map::new();
            m.insert(seg.clone(), leaf);
            leaf = JsonValue::Object(m);
        }
        if array_leaf && !leaf.is_array() {
            leaf = JsonValue::Array(vec![leaf]);
        }
        merge_value(&mut out, base, leaf);
    }
    out
}

fn split_brackets(key: &str) -> (String, Vec<String>) {
    let Some(open) = key.find('[') else {
        return (key.to_string(), Vec::new());
    };
    if open == 0 || !key.ends_with(']') {
        return (key.to_string(), Vec::new());
    }
    let base = key[..open].to_string();
    let inner = &key[open + 1..key.len() - 1];
    let path = inner.split("][").map(str::to_string).collect();
    (base, path)
}

fn merge_value(map: &mut RawQuery, key: String, value: JsonValue) {
    match map.get_mut(&key) {
        None => {
            map.insert(key, value);
        }
        Some(slot) => merge_into(slot, value),
    }
}

fn merge_into(slot: &mut JsonValue, value: JsonValue) {
    match (slot, value) {
        (JsonValue::Object(existing), JsonValue::Object(incoming)) => {
            for (k, v) in incoming {
                merge_value(existing, k, v);
            }
        }
        (JsonValue::Array(items), JsonValue::Array(more)) => items.extend(more),
        (JsonValue::Array(items), other) => items.push(other),
        (slot, other) => {
            let mut items = vec![slot.take()];
            match other {
                JsonValue::Array(more) => items.extend(more),
                other => items.push(other),
            }
            *slot = JsonValue::Array(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(qs: &[(&str, &str)]) -> RawQuery {
        nest_query_pairs(qs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn translates_operators_and_sort() {
        let raw = pairs(&[
            ("duration[gte]", "5"),
            ("difficulty", "easy"),
            ("sort", "-price,name"),
        ]);
        let q = TourQuery::translate(&raw).unwrap();
        assert_eq!(
            serde_json::to_value(&q.filter).unwrap(),
            json!({"duration": {"$gte": "5"}, "difficulty": "easy"})
        );
        assert_eq!(q.sort, vec![SortKey::desc("price"), SortKey::asc("name")]);
        assert_eq!(q.page, None);
        assert_eq!(q.projection, Projection::Default);
    }

    #[test]
    fn suffix_keys_never_survive() {
        let raw = pairs(&[
            ("price[lt]", "1000"),
            ("price[gt]", "100"),
            ("ratingAverage[lte]", "4.8"),
        ]);
        let q = TourQuery::translate(&raw).unwrap();
        let text = serde_json::to_string(&q.filter).unwrap();
        for suffix in ["\"lt\"", "\"gt\"", "\"lte\""] {
            assert!(!text.contains(suffix), "{text}");
        }
        assert_eq!(
            serde_json::to_value(&q.filter).unwrap(),
            json!({"price": {"$gt": "100", "$lt": "1000"}, "ratingAverage": {"$lte": "4.8"}})
        );
    }

    #[test]
    fn literals_equal_to_operator_names_are_untouched() {
        let raw = pairs(&[("summary", "gte"), ("name[lt]", "gt")]);
        let q = TourQuery::translate(&raw).unwrap();
        assert_eq!(
            serde_json::to_value(&q.filter).unwrap(),
            json!({"summary": "gte", "name": {"$lt": "gt"}})
        );
    }

    #[test]
    fn empty_query_matches_all_newest_first() {
        let q = TourQuery::translate(&RawQuery::new()).unwrap();
        assert!(q.filter.is_match_all());
        assert_eq!(q, TourQuery::default());
        assert_eq!(q.sort, vec![SortKey::desc("createdAt")]);
    }

    #[test]
    fn control_keys_are_stripped() {
        let raw = pairs(&[
            ("page", "2"),
            ("limit", "10"),
            ("fields", "name,duration"),
            ("sort", "price"),
        ]);
        let q = TourQuery::translate(&raw).unwrap();
        assert!(q.filter.is_match_all());
        assert_eq!(q.page, Some(Page { skip: 10, limit: 10 }));
        assert_eq!(
            q.projection,
            Projection::Include(vec!["name".into(), "duration".into()])
        );
    }

    #[test]
    fn page_without_limit_uses_default_size() {
        let q = TourQuery::translate(&pairs(&[("page", "3")])).unwrap();
        assert_eq!(
            q.page,
            Some(Page {
                skip: 2 * DEFAULT_PAGE_SIZE,
                limit: DEFAULT_PAGE_SIZE
            })
        );
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let cases = [
            pairs(&[("difficulty", "easy"), ("difficulty", "medium")]),
            pairs(&[("duration[gte][x]", "5")]),
            pairs(&[("duration[between]", "5")]),
            pairs(&[("limit", "0")]),
            pairs(&[("page", "two")]),
            pairs(&[("fields", "name,-price")]),
            pairs(&[("sort[]", "price")]),
        ];
        for raw in cases.iter() {
            let err = TourQuery::translate(raw).unwrap_err();
            assert!(
                matches!(err, TourError::MalformedFilter(_)),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn nesting_follows_bracket_syntax() {
        let raw = pairs(&[
            ("duration[gte]", "5"),
            ("duration[lt]", "9"),
            ("tag", "a"),
            ("tag", "b"),
        ]);
        assert_eq!(
            JsonValue::Object(raw),
            json!({"duration": {"gte": "5", "lt": "9"}, "tag": ["a", "b"]})
        );
    }

    #[test]
    fn projection_rules() {
        let doc = json!({"id": "X", "name": "n", "price": 1, "createdAt": "t"});
        assert_eq!(
            Projection::Default.apply(doc.clone()),
            json!({"id": "X", "name": "n", "price": 1})
        );
        assert_eq!(
            Projection::Include(vec!["name".into(), "createdAt".into()]).apply(doc.clone()),
            json!({"id": "X", "name": "n", "createdAt": "t"})
        );
        assert_eq!(
            Projection::Include(vec!["name".into(), "-id".into()]).apply(doc.clone()),
            json!({"name": "n"})
        );
        assert_eq!(
            Projection::Exclude(vec!["price".into()]).apply(doc),
            json!({"id": "X", "name": "n"})
        );
    }
}
