//! Sorting, filtering and pagination shared by every list view
//!
//! Records expose their columns through [`Sortable`]; the engine never knows
//! whether it is looking at jobs, runs or anything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PAGE_SIZE_OPTIONS: [usize; 3] = [5, 10, 25];
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One column value of a record
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue<'a> {
    Missing,
    Bool(bool),
    Number(f64),
    Time(DateTime<Utc>),
    Text(&'a str),
}

impl<'a> SortValue<'a> {
    pub fn text(value: &'a str) -> Self {
        SortValue::Text(value)
    }

    fn kind_rank(&self) -> u8 {
        match self {
            SortValue::Missing => 0,
            SortValue::Bool(_) => 1,
            SortValue::Number(_) => 2,
            SortValue::Time(_) => 3,
            SortValue::Text(_) => 4,
        }
    }

    fn render(&self) -> String {
        match self {
            SortValue::Missing => String::new(),
            SortValue::Bool(b) => b.to_string(),
            SortValue::Number(n) => n.to_string(),
            SortValue::Time(t) => t.to_rfc3339(),
            SortValue::Text(s) => s.to_string(),
        }
    }
}

pub trait Sortable {
    /// Value of column `key`; unknown columns are `Missing`
    fn sort_value(&self, key: &str) -> SortValue<'_>;

    /// Columns a bare filter word is matched against
    fn search_keys(&self) -> &'static [&'static str] {
        &[]
    }
}

/// `<` gives Less, `>` gives Greater, anything else Equal.
/// Values of different kinds order by kind (missing first) so the order stays total.
pub fn compare_values(a: &SortValue<'_>, b: &SortValue<'_>) -> Ordering {
    match (a, b) {
        (SortValue::Bool(x), SortValue::Bool(y)) => x.cmp(y),
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(y),
        (SortValue::Time(x), SortValue::Time(y)) => x.cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        _ => a.kind_rank().cmp(&b.kind_rank()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Stable sort on one column. Descending negates the comparison result, not the
/// operands, so ties keep their original relative order either way.
pub fn sort<T: Sortable>(records: &mut [T], key: &str, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ordering = compare_values(&a.sort_value(key), &b.sort_value(key));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Window `[page*limit, page*limit+limit)` clipped to the slice; never fails
pub fn paginate<T>(records: &[T], page: usize, limit: usize) -> &[T] {
    let start = page.saturating_mul(limit);
    if start >= records.len() {
        return &[];
    }
    let end = start.saturating_add(limit).min(records.len());
    &records[start..end]
}

pub fn page_count(total: usize, limit: usize) -> usize {
    if limit == 0 {
        0
    } else {
        total.div_ceil(limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortSpecError {
    #[error("sort spec {0:?} must look like \"column|asc\" or \"column|desc\"")]
    Malformed(String),
    #[error("unknown sort direction {0:?}")]
    Direction(String),
}

/// Column plus direction, written `updatedAt|desc` on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }

    /// Column header click: the active ascending column flips to descending,
    /// any other click sorts that column ascending
    pub fn toggle(&self, key: &str) -> SortSpec {
        let is_asc = self.key == key && self.direction == SortDirection::Asc;
        SortSpec::new(
            key,
            if is_asc {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        )
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::new("updatedAt", SortDirection::Desc)
    }
}

impl FromStr for SortSpec {
    type Err = SortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, direction) = s
            .split_once('|')
            .ok_or_else(|| SortSpecError::Malformed(s.to_string()))?;
        if key.is_empty() {
            return Err(SortSpecError::Malformed(s.to_string()));
        }
        let direction = match direction {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => return Err(SortSpecError::Direction(other.to_string())),
        };
        Ok(SortSpec::new(key, direction))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.key, self.direction.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterTerm {
    Field { key: String, needle: String },
    Any(String),
}

/// Free-text filter such as `status:completed spm`.
/// `key:value` tokens must match that column, bare words any search column;
/// every token has to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    terms: Vec<FilterTerm>,
}

impl Filter {
    pub fn parse(query: &str) -> Filter {
        let terms = query
            .split_whitespace()
            .map(|token| match token.split_once(':') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => FilterTerm::Field {
                    key: key.to_string(),
                    needle: value.to_lowercase(),
                },
                _ => FilterTerm::Any(token.to_lowercase()),
            })
            .collect();
        Filter { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches<T: Sortable>(&self, record: &T) -> bool {
        let contains = |key: &str, needle: &str| {
            record
                .sort_value(key)
                .render()
                .to_lowercase()
                .contains(needle)
        };

        self.terms.iter().all(|term| match term {
            FilterTerm::Field { key, needle } => contains(key, needle),
            FilterTerm::Any(needle) => record
                .search_keys()
                .iter()
                .any(|key| contains(key, needle)),
        })
    }
}

/// Keep the records matching `filter`; an empty filter passes everything through
pub fn filter<T: Sortable>(mut records: Vec<T>, filter: &Filter) -> Vec<T> {
    if !filter.is_empty() {
        records.retain(|record| filter.matches(record));
    }
    records
}

/// List-view state as held by the front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub sort: SortSpec,
    pub query: String,
    pub page: usize,
    pub limit: usize,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            sort: SortSpec::default(),
            query: String::new(),
            page: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TableState {
    /// Build from optional request parameters; a missing or zero limit falls back to `default_limit`
    pub fn from_request(
        sort: Option<&str>,
        query: Option<String>,
        page: Option<usize>,
        limit: Option<usize>,
        default_limit: usize,
    ) -> Result<TableState, SortSpecError> {
        Ok(TableState {
            sort: sort.map(str::parse::<SortSpec>).transpose()?.unwrap_or_default(),
            query: query.unwrap_or_default(),
            page: page.unwrap_or(0),
            limit: limit.filter(|l| *l > 0).unwrap_or(default_limit),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Records left after filtering, across all pages
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub page_count: usize,
    pub sort: String,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            page_count: self.page_count,
            sort: self.sort,
        }
    }
}

/// Filter, then sort, then cut out the requested page
pub fn apply<T: Sortable + Clone>(records: Vec<T>, state: &TableState) -> Page<T> {
    let mut records = filter(records, &Filter::parse(&state.query));
    sort(&mut records, &state.sort.key, state.sort.direction);

    let total = records.len();
    let items = paginate(&records, state.page, state.limit).to_vec();

    Page {
        items,
        total,
        page: state.page,
        limit: state.limit,
        page_count: page_count(total, state.limit),
        sort: state.sort.to_string(),
    }
}
