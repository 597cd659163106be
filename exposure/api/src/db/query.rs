use chrono::NaiveDate;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

/// A value bound into a query fragment.
///
/// Every user-controlled value travels through here as a bound parameter;
/// column expressions are only ever taken from controller whitelists.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
    Date(NaiveDate),
}

/// Accumulates the `where`, `order by`, `limit` and `offset` parts of a
/// listing query. Filters mutate an instance of this, and the db layer
/// renders and executes it against a selection statement.
#[derive(Debug, Default)]
pub struct SelectQuery {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one `where` fragment. The fragment uses `?` placeholders, one
    /// per entry of `values`.
    pub fn filter(&mut self, condition: &str, values: Vec<SqlValue>) {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
    }

    /// Push a membership fragment, `expr in (?, ?, ...)`, expanding one
    /// placeholder per value. `sqlx` cannot expand a Vec for an `in`
    /// clause directly, so the placeholder list is built here.
    /// No-op for an empty value list.
    pub fn filter_in(&mut self, expr: &str, values: Vec<SqlValue>) {
        if values.is_empty() {
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.conditions.push(format!("{} in ({})", expr, placeholders));
        self.values.extend(values);
    }

    /// Append one ordering term. The term must already be resolved
    /// through a sortable-column whitelist.
    pub fn order_by(&mut self, term: String) {
        self.order.push(term);
    }

    pub fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    pub fn offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    pub fn order_terms(&self) -> &[String] {
        &self.order
    }

    /// Render the full listing statement for the given selection.
    /// Limit and offset are integers and rendered inline.
    pub fn to_sql(&self, selection: &str) -> String {
        let mut sql = selection.to_string();
        if !self.conditions.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.conditions.join(" and "));
        }
        if !self.order.is_empty() {
            sql.push_str(" order by ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" offset {}", offset));
        }
        sql
    }

    /// Render a counting statement: same `where` clause, no ordering or
    /// pagination, so the total is independent of the requested page.
    pub fn to_count_sql(&self, selection: &str) -> String {
        let mut sql = selection.to_string();
        if !self.conditions.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.conditions.join(" and "));
        }
        sql
    }

    /// Bind every collected value, in insertion order, to the rendered
    /// statement.
    pub fn query<'q>(&'q self, sql: &'q str) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        let mut query = sqlx::query(sql);
        for value in &self.values {
            query = match value {
                SqlValue::Text(v) => query.bind(v),
                SqlValue::Int(v) => query.bind(v),
                SqlValue::Real(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
            };
        }
        query
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_bare_selection() {
        let query = SelectQuery::new();
        assert_eq!("select * from cve", query.to_sql("select * from cve"));
    }

    #[test]
    fn renders_conditions_in_order() {
        let mut query = SelectQuery::new();
        query.filter(
            "cve.public_date >= ? and cve.public_date <= ?",
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2022, 2, 2).unwrap()),
            ],
        );
        query.filter("cve.name like ?", vec![SqlValue::Text("%CVE-2021%".to_string())]);
        assert_eq!(
            "select * from cve where cve.public_date >= ? and cve.public_date <= ? and cve.name like ?",
            query.to_sql("select * from cve")
        );
    }

    #[test]
    fn expands_membership_placeholders() {
        let mut query = SelectQuery::new();
        query.filter_in(
            "cve.severity",
            vec![
                SqlValue::Text("critical".to_string()),
                SqlValue::Text("important".to_string()),
            ],
        );
        assert_eq!(
            "select * from cve where cve.severity in (?, ?)",
            query.to_sql("select * from cve")
        );
    }

    #[test]
    fn empty_membership_is_dropped() {
        let mut query = SelectQuery::new();
        query.filter_in("cve.severity", Vec::new());
        assert_eq!("select * from cve", query.to_sql("select * from cve"));
    }

    #[test]
    fn renders_order_and_pagination() {
        let mut query = SelectQuery::new();
        query.order_by("cve.public_date desc nulls last".to_string());
        query.order_by("cve.name asc nulls last".to_string());
        query.limit(20);
        query.offset(40);
        assert_eq!(
            "select * from cve order by cve.public_date desc nulls last, cve.name asc nulls last limit 20 offset 40",
            query.to_sql("select * from cve")
        );
    }

    #[test]
    fn count_ignores_order_and_pagination() {
        let mut query = SelectQuery::new();
        query.filter("cve.name like ?", vec![SqlValue::Text("%x%".to_string())]);
        query.order_by("cve.name asc nulls last".to_string());
        query.limit(10);
        query.offset(5);
        assert_eq!(
            "select count(*) as total from cve where cve.name like ?",
            query.to_count_sql("select count(*) as total from cve")
        );
    }
}
