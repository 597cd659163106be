use actix_web::{get, web, HttpResponse};
use exposure_model::{ErrorInformation, PagedCves, PagedResponse};

use crate::db::query::SelectQuery;
use crate::error::Error;
use crate::filters::sort::{SortArgs, SortItem};
use crate::filters::{self, FilterContext, FilterParams, SearchTarget};
use crate::AppState;

const ALLOWED_FILTERS: &[&str] = &[
    filters::SEARCH_QUERY,
    filters::PUBLISHED_QUERY,
    filters::SEVERITY_QUERY,
    filters::CVSS_SCORE_QUERY,
    filters::AFFECTED_CLUSTERS_QUERY,
    filters::AFFECTED_IMAGES_QUERY,
    filters::LIMIT_QUERY,
    filters::OFFSET_QUERY,
    filters::SORT_QUERY,
];

fn sort_args() -> SortArgs {
    SortArgs {
        sortable_columns: [
            ("synopsis", "cve.name"),
            ("public_date", "cve.public_date"),
            ("severity", "cve.severity"),
            ("cvss_score", "coalesce(cve.cvss3_score, cve.cvss2_score)"),
        ]
        .into(),
        default_sort: vec![
            SortItem::descending("public_date"),
            SortItem::ascending("synopsis"),
        ],
    }
}

/// List CVEs affecting the cluster fleet
#[utoipa::path(
    get,
    tag = "exposure",
    path = "/api/v1/cves",
    params(FilterParams),
    responses(
        (status = 200, description = "CVE listing", body = PagedCves),
        (status = BAD_REQUEST, description = "Invalid filter parameters", body = ErrorInformation),
    ),
)]
#[get("/cves")]
pub(crate) async fn list(
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
) -> Result<HttpResponse, Error> {
    let params = params.into_inner();
    let limit = filters::effective_limit(&params);
    let offset = filters::effective_offset(&params);
    let mut requested = filters::requested_filters(&params)?;
    let ctx = FilterContext {
        search: SearchTarget::Cves,
        sort: Some(sort_args()),
    };

    let mut query = SelectQuery::new();
    filters::apply_filters(&mut query, ALLOWED_FILTERS, &mut requested, &ctx)?;

    let total_items = state.db.count_cves(&query).await?;
    let data = state.db.list_cves(&query).await?;
    let meta = filters::list_meta(&requested, ALLOWED_FILTERS, limit, offset, total_items);

    Ok(HttpResponse::Ok().json(PagedResponse { data, meta }))
}
