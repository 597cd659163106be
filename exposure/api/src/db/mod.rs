pub mod query;

use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, TimeZone, Utc};
use exposure_model::{Cluster, Cve, Severity};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use self::query::SelectQuery;

static DB_FILE_NAME: &str = "exposure.db";

const CVE_SELECTION: &str =
    "select cve.name, cve.description, cve.public_date, cve.severity, cve.cvss2_score, cve.cvss3_score from cve";
const CVE_COUNT: &str = "select count(*) as total from cve";
const CLUSTER_SELECTION: &str =
    "select cluster.uuid, cluster.status, cluster.version, cluster.provider, cluster.last_seen from cluster";
const CLUSTER_COUNT: &str = "select count(*) as total from cluster";

pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn new(base: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let db = Self {
            pool: SqlitePool::connect_with(if cfg!(test) {
                SqliteConnectOptions::from_str(":memory:")?
            } else {
                SqliteConnectOptions::default()
                    .filename(base.as_ref().join(DB_FILE_NAME))
                    .create_if_missing(true)
            })
            .await?,
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), anyhow::Error> {
        self.create_cve_table().await?;
        self.create_cluster_table().await?;
        Ok(())
    }

    async fn create_cve_table(&self) -> Result<(), anyhow::Error> {
        log::debug!("create table 'cve'");
        sqlx::query(
            r#"create table if not exists cve (
                    name text not null,
                    description text not null,
                    public_date date,
                    severity text,
                    cvss2_score real,
                    cvss3_score real
                )"#,
        )
        .execute(&self.pool)
        .await?;

        log::debug!("create index 'cve_pk'");
        sqlx::query(
            r#"
            create unique index if not exists cve_pk on cve ( name ) ;
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_cluster_table(&self) -> Result<(), anyhow::Error> {
        log::debug!("create table 'cluster'");
        sqlx::query(
            r#"create table if not exists cluster (
                    uuid text not null,
                    status text,
                    version text,
                    provider text,
                    last_seen datetime
                )"#,
        )
        .execute(&self.pool)
        .await?;

        log::debug!("create index 'cluster_pk'");
        sqlx::query(
            r#"
            create unique index if not exists cluster_pk on cluster ( uuid ) ;
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_cve(&self, cve: &Cve) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"insert or replace into cve (name, description, public_date, severity, cvss2_score, cvss3_score)
               values ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&cve.name)
        .bind(&cve.description)
        .bind(cve.public_date)
        .bind(cve.severity.to_string())
        .bind(cve.cvss2_score)
        .bind(cve.cvss3_score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_cluster(&self, cluster: &Cluster) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"insert or replace into cluster (uuid, status, version, provider, last_seen)
               values ($1, $2, $3, $4, $5)"#,
        )
        .bind(&cluster.uuid)
        .bind(&cluster.status)
        .bind(&cluster.version)
        .bind(&cluster.provider)
        .bind(cluster.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_cves(&self, query: &SelectQuery) -> Result<Vec<Cve>, anyhow::Error> {
        let sql = query.to_sql(CVE_SELECTION);
        log::debug!("list cves: {sql}");
        let rows = query.query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(cve_from_row).collect()
    }

    pub async fn count_cves(&self, query: &SelectQuery) -> Result<u64, anyhow::Error> {
        let sql = query.to_count_sql(CVE_COUNT);
        let row = query.query(&sql).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    pub async fn list_clusters(&self, query: &SelectQuery) -> Result<Vec<Cluster>, anyhow::Error> {
        let sql = query.to_sql(CLUSTER_SELECTION);
        log::debug!("list clusters: {sql}");
        let rows = query.query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(cluster_from_row).collect()
    }

    pub async fn count_clusters(&self, query: &SelectQuery) -> Result<u64, anyhow::Error> {
        let sql = query.to_count_sql(CLUSTER_COUNT);
        let row = query.query(&sql).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    /// Seed a small demonstration dataset, for `--devmode`.
    pub async fn seed_demo(&self) -> Result<(), anyhow::Error> {
        log::info!("seeding demonstration data");
        for cve in demo_cves() {
            self.insert_cve(&cve).await?;
        }
        for cluster in demo_clusters() {
            self.insert_cluster(&cluster).await?;
        }
        Ok(())
    }
}

fn cve_from_row(row: &SqliteRow) -> Result<Cve, anyhow::Error> {
    let severity: String = row.get("severity");
    Ok(Cve {
        name: row.get("name"),
        description: row.get("description"),
        public_date: row.get("public_date"),
        severity: Severity::from_str(&severity)?,
        cvss2_score: row.get("cvss2_score"),
        cvss3_score: row.get("cvss3_score"),
    })
}

fn cluster_from_row(row: &SqliteRow) -> Result<Cluster, anyhow::Error> {
    Ok(Cluster {
        uuid: row.get("uuid"),
        status: row.get("status"),
        version: row.get("version"),
        provider: row.get("provider"),
        last_seen: row.get("last_seen"),
    })
}

fn demo_cves() -> Vec<Cve> {
    vec![
        Cve {
            name: "CVE-2021-44228".to_string(),
            description: "Remote code execution in Apache Log4j2 JNDI lookups".to_string(),
            public_date: NaiveDate::from_ymd_opt(2021, 12, 10).unwrap(),
            severity: Severity::Critical,
            cvss2_score: Some(9.3),
            cvss3_score: Some(10.0),
        },
        Cve {
            name: "CVE-2022-0185".to_string(),
            description: "Heap overflow in the Linux kernel filesystem context".to_string(),
            public_date: NaiveDate::from_ymd_opt(2022, 1, 18).unwrap(),
            severity: Severity::Important,
            cvss2_score: None,
            cvss3_score: Some(8.4),
        },
        Cve {
            name: "CVE-2020-8555".to_string(),
            description: "Half-blind SSRF in kube-controller-manager".to_string(),
            public_date: NaiveDate::from_ymd_opt(2020, 6, 5).unwrap(),
            severity: Severity::Moderate,
            cvss2_score: Some(3.5),
            cvss3_score: None,
        },
    ]
}

fn demo_clusters() -> Vec<Cluster> {
    vec![
        Cluster {
            uuid: "4deadbee-f000-4000-8000-000000000001".to_string(),
            status: "connected".to_string(),
            version: "4.12.3".to_string(),
            provider: "aws".to_string(),
            last_seen: Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap(),
        },
        Cluster {
            uuid: "4deadbee-f000-4000-8000-000000000002".to_string(),
            status: "stale".to_string(),
            version: "4.11.0".to_string(),
            provider: "gcp".to_string(),
            last_seen: Utc.with_ymd_and_hms(2023, 1, 15, 8, 30, 0).unwrap(),
        },
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::query::SqlValue;

    async fn seeded_db() -> Result<Db, anyhow::Error> {
        let _ = env_logger::try_init();
        let db = Db::new(".").await?;
        db.seed_demo().await?;
        Ok(db)
    }

    #[actix_web::test]
    async fn list_is_a_plain_select_without_filters() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let cves = db.list_cves(&SelectQuery::new()).await?;
        assert_eq!(3, cves.len());
        assert_eq!(3, db.count_cves(&SelectQuery::new()).await?);
        Ok(())
    }

    #[actix_web::test]
    async fn filters_by_severity_membership() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let mut query = SelectQuery::new();
        query.filter_in(
            "cve.severity",
            vec![
                SqlValue::Text("critical".to_string()),
                SqlValue::Text("important".to_string()),
            ],
        );
        let cves = db.list_cves(&query).await?;
        assert_eq!(2, cves.len());
        assert!(cves.iter().all(|cve| cve.severity >= Severity::Important));
        Ok(())
    }

    #[actix_web::test]
    async fn date_range_bounds_are_inclusive() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let mut query = SelectQuery::new();
        query.filter(
            "cve.public_date >= ? and cve.public_date <= ?",
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(2021, 12, 10).unwrap()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2022, 1, 18).unwrap()),
            ],
        );
        let cves = db.list_cves(&query).await?;
        let names: Vec<_> = cves.iter().map(|cve| cve.name.as_str()).collect();
        assert_eq!(2, names.len());
        assert!(names.contains(&"CVE-2021-44228"));
        assert!(names.contains(&"CVE-2022-0185"));
        Ok(())
    }

    #[actix_web::test]
    async fn score_range_coalesces_generations() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        // CVE-2020-8555 only carries a cvss2 score; the coalesced range
        // must still find it
        let mut query = SelectQuery::new();
        query.filter(
            "coalesce(cve.cvss3_score, cve.cvss2_score) >= ? and coalesce(cve.cvss3_score, cve.cvss2_score) <= ?",
            vec![SqlValue::Real(3.0), SqlValue::Real(4.0)],
        );
        let cves = db.list_cves(&query).await?;
        assert_eq!(1, cves.len());
        assert_eq!("CVE-2020-8555", cves[0].name);
        Ok(())
    }

    #[actix_web::test]
    async fn nulls_sort_last_in_either_direction() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        db.insert_cve(&Cve {
            name: "CVE-2019-0000".to_string(),
            description: "No score recorded".to_string(),
            public_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            severity: Severity::None,
            cvss2_score: None,
            cvss3_score: None,
        })
        .await?;

        let mut query = SelectQuery::new();
        query.order_by("coalesce(cve.cvss3_score, cve.cvss2_score) desc nulls last".to_string());
        let cves = db.list_cves(&query).await?;
        assert_eq!("CVE-2021-44228", cves.first().unwrap().name);
        assert_eq!("CVE-2019-0000", cves.last().unwrap().name);

        let mut query = SelectQuery::new();
        query.order_by("coalesce(cve.cvss3_score, cve.cvss2_score) asc nulls last".to_string());
        let cves = db.list_cves(&query).await?;
        assert_eq!("CVE-2020-8555", cves.first().unwrap().name);
        assert_eq!("CVE-2019-0000", cves.last().unwrap().name);
        Ok(())
    }

    #[actix_web::test]
    async fn pagination_does_not_change_the_total() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let mut query = SelectQuery::new();
        query.order_by("cve.name asc nulls last".to_string());
        query.limit(2);
        query.offset(2);
        let cves = db.list_cves(&query).await?;
        assert_eq!(1, cves.len());
        assert_eq!("CVE-2022-0185", cves[0].name);
        assert_eq!(3, db.count_cves(&query).await?);
        Ok(())
    }

    #[actix_web::test]
    async fn searches_clusters_by_uuid_fragment() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let mut query = SelectQuery::new();
        query.filter(
            "cluster.uuid like ?",
            vec![SqlValue::Text("%000002%".to_string())],
        );
        let clusters = db.list_clusters(&query).await?;
        assert_eq!(1, clusters.len());
        assert_eq!("stale", clusters[0].status);
        assert_eq!(1, db.count_clusters(&query).await?);
        Ok(())
    }

    #[actix_web::test]
    async fn upserts_replace_existing_rows() -> Result<(), anyhow::Error> {
        let db = seeded_db().await?;
        let mut updated = demo_cves().remove(0);
        updated.severity = Severity::Low;
        db.insert_cve(&updated).await?;

        let cves = db.list_cves(&SelectQuery::new()).await?;
        assert_eq!(3, cves.len());
        let row = cves.iter().find(|cve| cve.name == updated.name).unwrap();
        assert_eq!(Severity::Low, row.severity);
        Ok(())
    }
}
