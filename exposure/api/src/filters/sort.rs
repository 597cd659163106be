use std::collections::HashMap;

use crate::db::query::SelectQuery;

use super::{Filter, FilterContext, FilterError, RawFilter, SORT_QUERY};

/// A single column sort expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortItem {
    pub column: String,
    pub desc: bool,
}

impl SortItem {
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            desc: false,
        }
    }

    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            desc: true,
        }
    }

    /// Parse one raw sort value; a `-` prefix sorts descending.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(column) => Self::descending(column),
            None => Self::ascending(raw),
        }
    }
}

/// Sorting configuration of one endpoint.
///
/// `sortable_columns` maps user facing column names to the SQL
/// expressions they are allowed to resolve to; `default_sort` is applied
/// after any user selected columns.
#[derive(Clone, Debug, Default)]
pub struct SortArgs {
    pub sortable_columns: HashMap<&'static str, &'static str>,
    pub default_sort: Vec<SortItem>,
}

/// Sorts a query by a list of sort expressions, e.g.
/// `sort=synopsis,-cvss_score`.
pub struct Sort {
    raw: RawFilter,
    values: Vec<SortItem>,
}

impl Sort {
    pub fn new(raw_values: Vec<String>) -> Self {
        let values = raw_values.iter().map(|value| SortItem::parse(value)).collect();
        Self {
            raw: RawFilter::new(SORT_QUERY, raw_values),
            values,
        }
    }
}

fn order_term(expr: &str, desc: bool) -> String {
    // nulls always sort last, whichever direction is requested
    if desc {
        format!("{} desc nulls last", expr)
    } else {
        format!("{} asc nulls last", expr)
    }
}

impl Filter for Sort {
    /// The query is sorted first by the user selected columns, in request
    /// order, then by the endpoint's default columns.
    ///
    /// A user column missing from the sortable whitelist fails the whole
    /// request without contributing any ordering. A default column
    /// missing from the whitelist is skipped silently. Applied defaults
    /// are recorded back into the raw echo values so clients see the
    /// effective sort.
    fn apply(&mut self, query: &mut SelectQuery, ctx: &FilterContext) -> Result<(), FilterError> {
        let Some(args) = &ctx.sort else {
            return Ok(());
        };

        let mut terms = Vec::with_capacity(self.values.len() + args.default_sort.len());
        for item in &self.values {
            match args.sortable_columns.get(item.column.as_str()) {
                Some(expr) => terms.push(order_term(expr, item.desc)),
                None => return Err(FilterError::InvalidSortColumn),
            }
        }

        for item in &args.default_sort {
            if let Some(expr) = args.sortable_columns.get(item.column.as_str()) {
                terms.push(order_term(expr, item.desc));
                if item.desc {
                    self.raw.values.push(format!("-{}", item.column));
                } else {
                    self.raw.values.push(item.column.clone());
                }
            }
        }

        for term in terms {
            query.order_by(term);
        }
        Ok(())
    }

    fn raw(&self) -> &RawFilter {
        &self.raw
    }
}

#[cfg(test)]
mod test {
    use super::super::SearchTarget;
    use super::*;

    fn args() -> SortArgs {
        SortArgs {
            sortable_columns: [
                ("synopsis", "cve.name"),
                ("public_date", "cve.public_date"),
                ("cvss_score", "coalesce(cve.cvss3_score, cve.cvss2_score)"),
            ]
            .into(),
            default_sort: vec![
                SortItem::descending("public_date"),
                SortItem::ascending("synopsis"),
            ],
        }
    }

    fn ctx(args: SortArgs) -> FilterContext {
        FilterContext {
            search: SearchTarget::Cves,
            sort: Some(args),
        }
    }

    #[test]
    fn parses_direction_prefix() {
        assert_eq!(SortItem::ascending("synopsis"), SortItem::parse("synopsis"));
        assert_eq!(SortItem::descending("cvss_score"), SortItem::parse("-cvss_score"));
    }

    #[test]
    fn user_columns_come_first_in_request_order() {
        let mut sort = Sort::new(vec!["-cvss_score".to_string(), "synopsis".to_string()]);
        let mut query = SelectQuery::new();
        sort.apply(&mut query, &ctx(args())).unwrap();
        assert_eq!(
            vec![
                "coalesce(cve.cvss3_score, cve.cvss2_score) desc nulls last".to_string(),
                "cve.name asc nulls last".to_string(),
                "cve.public_date desc nulls last".to_string(),
                "cve.name asc nulls last".to_string(),
            ],
            query.order_terms()
        );
    }

    #[test]
    fn unknown_user_column_fails_without_ordering() {
        let mut sort = Sort::new(vec!["synopsis".to_string(), "bogus".to_string()]);
        let mut query = SelectQuery::new();
        assert_eq!(
            Err(FilterError::InvalidSortColumn),
            sort.apply(&mut query, &ctx(args()))
        );
        assert!(query.order_terms().is_empty());
        // no defaults were appended to the echo either
        assert_eq!("synopsis,bogus", sort.raw_value());
    }

    #[test]
    fn defaults_apply_when_nothing_is_requested() {
        let mut sort = Sort::new(Vec::new());
        let mut query = SelectQuery::new();
        sort.apply(&mut query, &ctx(args())).unwrap();
        assert_eq!(
            vec![
                "cve.public_date desc nulls last".to_string(),
                "cve.name asc nulls last".to_string(),
            ],
            query.order_terms()
        );
        assert_eq!("-public_date,synopsis", sort.raw_value());
    }

    #[test]
    fn defaults_missing_from_the_whitelist_are_skipped() {
        let mut args = args();
        args.default_sort = vec![
            SortItem::descending("unlisted"),
            SortItem::ascending("synopsis"),
        ];
        let mut sort = Sort::new(vec!["public_date".to_string()]);
        let mut query = SelectQuery::new();
        sort.apply(&mut query, &ctx(args)).unwrap();
        assert_eq!(
            vec![
                "cve.public_date asc nulls last".to_string(),
                "cve.name asc nulls last".to_string(),
            ],
            query.order_terms()
        );
        assert_eq!("public_date,synopsis", sort.raw_value());
    }

    #[test]
    fn no_sort_args_is_a_no_op() {
        let mut sort = Sort::new(vec!["synopsis".to_string()]);
        let mut query = SelectQuery::new();
        let ctx = FilterContext {
            search: SearchTarget::Cves,
            sort: None,
        };
        sort.apply(&mut query, &ctx).unwrap();
        assert!(query.order_terms().is_empty());
    }
}
