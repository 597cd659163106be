//! Translation of listing query parameters into predicates over a
//! [`SelectQuery`]. Endpoints declare which filters they allow and how
//! their sortable columns map to SQL expressions; everything else,
//! including the raw-value echo reported back to clients, lives here.

pub mod sort;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use exposure_model::{ListMeta, Severity};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::db::query::{SelectQuery, SqlValue};
use self::sort::{Sort, SortArgs};

pub const SEARCH_QUERY: &str = "search";
pub const PUBLISHED_QUERY: &str = "published";
pub const SEVERITY_QUERY: &str = "severity";
pub const CVSS_SCORE_QUERY: &str = "cvss_score";
pub const AFFECTED_CLUSTERS_QUERY: &str = "affected_clusters";
pub const AFFECTED_IMAGES_QUERY: &str = "affected_images";
pub const LIMIT_QUERY: &str = "limit";
pub const OFFSET_QUERY: &str = "offset";
pub const SORT_QUERY: &str = "sort";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid sort column selected")]
    InvalidSortColumn,
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid range `{0}`, expected FROM,TO")]
    InvalidRange(String),
    #[error("invalid severity `{0}`")]
    InvalidSeverity(String),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("invalid filter flag `{0}`")]
    InvalidFlag(String),
}

/// Which columns the search filter probes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchTarget {
    /// CVE name or description, for the CVE listing.
    Cves,
    /// Cluster UUID, for the exposed-clusters listing.
    ExposedClusters,
}

/// Per-endpoint filter configuration, supplied by the endpoint handler.
#[derive(Clone, Debug)]
pub struct FilterContext {
    pub search: SearchTarget,
    pub sort: Option<SortArgs>,
}

/// Raw query parameter name and values as parsed from the request,
/// echoed back to clients in the listing metadata.
#[derive(Clone, Debug, Default)]
pub struct RawFilter {
    pub param: &'static str,
    pub values: Vec<String>,
}

impl RawFilter {
    pub fn new(param: &'static str, values: Vec<String>) -> Self {
        Self { param, values }
    }
}

/// One filter obtained from a query argument of the request link.
///
/// The receiver is mutable because the sort filter records applied
/// default ordering back into its raw echo values.
pub trait Filter {
    fn apply(&mut self, query: &mut SelectQuery, ctx: &FilterContext) -> Result<(), FilterError>;

    fn raw(&self) -> &RawFilter;

    fn raw_name(&self) -> &str {
        self.raw().param
    }

    fn raw_values(&self) -> &[String] {
        &self.raw().values
    }

    /// Raw values formatted back into a query value string.
    fn raw_value(&self) -> String {
        self.raw().values.join(",")
    }
}

pub type FilterMap = HashMap<&'static str, Box<dyn Filter>>;

/// Substring search, e.g. `search=CVE-2022`.
pub struct Search {
    raw: RawFilter,
    value: String,
}

impl Search {
    pub fn new(value: &str) -> Self {
        Self {
            raw: RawFilter::new(SEARCH_QUERY, vec![value.to_string()]),
            value: value.to_string(),
        }
    }
}

impl Filter for Search {
    fn apply(&mut self, query: &mut SelectQuery, ctx: &FilterContext) -> Result<(), FilterError> {
        let pattern = format!("%{}%", self.value);
        match ctx.search {
            SearchTarget::Cves => query.filter(
                "(cve.name like ? or cve.description like ?)",
                vec![SqlValue::Text(pattern.clone()), SqlValue::Text(pattern)],
            ),
            SearchTarget::ExposedClusters => {
                query.filter("cluster.uuid like ?", vec![SqlValue::Text(pattern)])
            }
        }
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// Publish date range, e.g. `published=2021-01-01,2022-02-02`.
/// Both bounds are inclusive.
pub struct PublishDate {
    raw: RawFilter,
    from: NaiveDate,
    to: NaiveDate,
}

impl PublishDate {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let parts = split_values(raw);
        let [from, to] = parts.as_slice() else {
            return Err(FilterError::InvalidRange(raw.to_string()));
        };
        let from = NaiveDate::parse_from_str(from, DATE_FORMAT)
            .map_err(|_| FilterError::InvalidDate(from.clone()))?;
        let to = NaiveDate::parse_from_str(to, DATE_FORMAT)
            .map_err(|_| FilterError::InvalidDate(to.clone()))?;
        Ok(Self {
            raw: RawFilter::new(PUBLISHED_QUERY, parts),
            from,
            to,
        })
    }
}

impl Filter for PublishDate {
    fn apply(&mut self, query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        query.filter(
            "cve.public_date >= ? and cve.public_date <= ?",
            vec![SqlValue::Date(self.from), SqlValue::Date(self.to)],
        );
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// Severity set membership, e.g. `severity=critical,important,none`.
pub struct SeverityFilter {
    raw: RawFilter,
    values: Vec<Severity>,
}

impl SeverityFilter {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let parts = split_values(raw);
        let values = parts
            .iter()
            .map(|part| {
                Severity::from_str(part).map_err(|_| FilterError::InvalidSeverity(part.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: RawFilter::new(SEVERITY_QUERY, parts),
            values,
        })
    }
}

impl Filter for SeverityFilter {
    fn apply(&mut self, query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        query.filter_in(
            "cve.severity",
            self.values
                .iter()
                .map(|severity| SqlValue::Text(severity.to_string()))
                .collect(),
        );
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// CVSS score range over either score generation, e.g. `cvss_score=0.0,9.0`.
/// Both bounds are inclusive.
pub struct CvssScore {
    raw: RawFilter,
    from: f64,
    to: f64,
}

impl CvssScore {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let parts = split_values(raw);
        let [from, to] = parts.as_slice() else {
            return Err(FilterError::InvalidRange(raw.to_string()));
        };
        let from = from
            .parse::<f64>()
            .map_err(|_| FilterError::InvalidNumber(from.clone()))?;
        let to = to
            .parse::<f64>()
            .map_err(|_| FilterError::InvalidNumber(to.clone()))?;
        Ok(Self {
            raw: RawFilter::new(CVSS_SCORE_QUERY, parts),
            from,
            to,
        })
    }
}

impl Filter for CvssScore {
    fn apply(&mut self, query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        query.filter(
            "coalesce(cve.cvss3_score, cve.cvss2_score) >= ? and coalesce(cve.cvss3_score, cve.cvss2_score) <= ?",
            vec![SqlValue::Real(self.from), SqlValue::Real(self.to)],
        );
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// To be implemented.
pub struct AffectingClusters {
    raw: RawFilter,
    pub one_or_more: bool,
    pub none: bool,
}

impl AffectingClusters {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let (values, one_or_more, none) = parse_exposure_flags(raw)?;
        Ok(Self {
            raw: RawFilter::new(AFFECTED_CLUSTERS_QUERY, values),
            one_or_more,
            none,
        })
    }
}

impl Filter for AffectingClusters {
    fn apply(&mut self, _query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// To be implemented.
pub struct AffectingImages {
    raw: RawFilter,
    pub one_or_more: bool,
    pub none: bool,
}

impl AffectingImages {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let (values, one_or_more, none) = parse_exposure_flags(raw)?;
        Ok(Self {
            raw: RawFilter::new(AFFECTED_IMAGES_QUERY, values),
            one_or_more,
            none,
        })
    }
}

impl Filter for AffectingImages {
    fn apply(&mut self, _query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

fn parse_exposure_flags(raw: &str) -> Result<(Vec<String>, bool, bool), FilterError> {
    let values = split_values(raw);
    let mut one_or_more = false;
    let mut none = false;
    for value in &values {
        match value.as_str() {
            "one_or_more" => one_or_more = true,
            "none" => none = true,
            other => return Err(FilterError::InvalidFlag(other.to_string())),
        }
    }
    Ok((values, one_or_more, none))
}

/// Rows per page, e.g. `limit=20`.
pub struct Limit {
    raw: RawFilter,
    value: u64,
}

impl Limit {
    pub fn new(value: u64) -> Self {
        Self {
            raw: RawFilter::new(LIMIT_QUERY, vec![value.to_string()]),
            value,
        }
    }
}

impl Filter for Limit {
    fn apply(&mut self, query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        query.limit(self.value);
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// First row of the page, e.g. `offset=40`.
pub struct Offset {
    raw: RawFilter,
    value: u64,
}

impl Offset {
    pub fn new(value: u64) -> Self {
        Self {
            raw: RawFilter::new(OFFSET_QUERY, vec![value.to_string()]),
            value,
        }
    }
}

impl Filter for Offset {
    fn apply(&mut self, query: &mut SelectQuery, _ctx: &FilterContext) -> Result<(), FilterError> {
        query.offset(self.value);
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

/// Listing query parameters common to all listing endpoints. Which of
/// them actually apply is up to each endpoint's allow-list.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
pub struct FilterParams {
    /// Substring to search for
    pub search: Option<String>,
    /// Publish date range, `YYYY-MM-DD,YYYY-MM-DD` (inclusive)
    pub published: Option<String>,
    /// Comma separated severities
    pub severity: Option<String>,
    /// CVSS score range, `FROM,TO` (inclusive)
    pub cvss_score: Option<String>,
    /// Exposure flags, `one_or_more` and/or `none`
    pub affected_clusters: Option<String>,
    /// Exposure flags, `one_or_more` and/or `none`
    pub affected_images: Option<String>,
    /// Max number of rows to return
    pub limit: Option<u64>,
    /// Offset of rows to return (for pagination)
    pub offset: Option<u64>,
    /// Comma separated sort columns, `-` prefix sorts descending
    pub sort: Option<String>,
}

pub fn effective_limit(params: &FilterParams) -> u64 {
    params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

pub fn effective_offset(params: &FilterParams) -> u64 {
    params.offset.unwrap_or(0)
}

/// Build the requested-filter map from the parsed query parameters.
///
/// Pagination and sort filters are always present: listings stay bounded
/// and report their effective order even when the request names neither.
pub fn requested_filters(params: &FilterParams) -> Result<FilterMap, FilterError> {
    let mut filters: FilterMap = HashMap::new();

    if let Some(search) = &params.search {
        filters.insert(SEARCH_QUERY, Box::new(Search::new(search)));
    }
    if let Some(published) = &params.published {
        filters.insert(PUBLISHED_QUERY, Box::new(PublishDate::parse(published)?));
    }
    if let Some(severity) = &params.severity {
        filters.insert(SEVERITY_QUERY, Box::new(SeverityFilter::parse(severity)?));
    }
    if let Some(score) = &params.cvss_score {
        filters.insert(CVSS_SCORE_QUERY, Box::new(CvssScore::parse(score)?));
    }
    if let Some(value) = &params.affected_clusters {
        filters.insert(AFFECTED_CLUSTERS_QUERY, Box::new(AffectingClusters::parse(value)?));
    }
    if let Some(value) = &params.affected_images {
        filters.insert(AFFECTED_IMAGES_QUERY, Box::new(AffectingImages::parse(value)?));
    }
    filters.insert(LIMIT_QUERY, Box::new(Limit::new(effective_limit(params))));
    filters.insert(OFFSET_QUERY, Box::new(Offset::new(effective_offset(params))));
    let sort_values = params.sort.as_deref().map(split_values).unwrap_or_default();
    filters.insert(SORT_QUERY, Box::new(Sort::new(sort_values)));

    Ok(filters)
}

/// Apply the requested filters onto the query created by the endpoint.
/// Only filters named in the endpoint's allow-list are applied, in
/// allow-list order; the first failing filter aborts the remainder.
pub fn apply_filters(
    query: &mut SelectQuery,
    allowed: &[&str],
    requested: &mut FilterMap,
    ctx: &FilterContext,
) -> Result<(), FilterError> {
    for name in allowed {
        if let Some(filter) = requested.get_mut(*name) {
            filter.apply(query, ctx)?;
        }
    }
    Ok(())
}

/// Listing metadata echoing every allow-listed filter that was requested.
/// Must be built after [`apply_filters`] so the sort echo includes the
/// appended defaults.
pub fn list_meta(
    requested: &FilterMap,
    allowed: &[&str],
    limit: u64,
    offset: u64,
    total_items: u64,
) -> ListMeta {
    let echo = |name: &'static str| {
        if allowed.contains(&name) {
            requested.get(name).map(|filter| filter.raw_value())
        } else {
            None
        }
    };
    ListMeta {
        limit,
        offset,
        total_items,
        search: echo(SEARCH_QUERY),
        published: echo(PUBLISHED_QUERY),
        severity: echo(SEVERITY_QUERY),
        cvss_score: echo(CVSS_SCORE_QUERY),
        affected_clusters: echo(AFFECTED_CLUSTERS_QUERY),
        affected_images: echo(AFFECTED_IMAGES_QUERY),
        sort: echo(SORT_QUERY),
    }
}

fn split_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
