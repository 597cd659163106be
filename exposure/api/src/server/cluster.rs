use actix_web::{get, web, HttpResponse};
use exposure_model::{ErrorInformation, PagedClusters, PagedResponse};

use crate::db::query::SelectQuery;
use crate::error::Error;
use crate::filters::sort::{SortArgs, SortItem};
use crate::filters::{self, FilterContext, FilterParams, SearchTarget};
use crate::AppState;

const ALLOWED_FILTERS: &[&str] = &[
    filters::SEARCH_QUERY,
    filters::LIMIT_QUERY,
    filters::OFFSET_QUERY,
    filters::SORT_QUERY,
];

fn sort_args() -> SortArgs {
    SortArgs {
        sortable_columns: [
            ("uuid", "cluster.uuid"),
            ("status", "cluster.status"),
            ("version", "cluster.version"),
            ("provider", "cluster.provider"),
            ("last_seen", "cluster.last_seen"),
        ]
        .into(),
        default_sort: vec![
            SortItem::descending("last_seen"),
            SortItem::ascending("uuid"),
        ],
    }
}

/// List clusters exposed to known CVEs
#[utoipa::path(
    get,
    tag = "exposure",
    path = "/api/v1/clusters",
    params(FilterParams),
    responses(
        (status = 200, description = "Exposed cluster listing", body = PagedClusters),
        (status = BAD_REQUEST, description = "Invalid filter parameters", body = ErrorInformation),
    ),
)]
#[get("/clusters")]
pub(crate) async fn list(
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
) -> Result<HttpResponse, Error> {
    let params = params.into_inner();
    let limit = filters::effective_limit(&params);
    let offset = filters::effective_offset(&params);
    let mut requested = filters::requested_filters(&params)?;
    let ctx = FilterContext {
        search: SearchTarget::ExposedClusters,
        sort: Some(sort_args()),
    };

    let mut query = SelectQuery::new();
    filters::apply_filters(&mut query, ALLOWED_FILTERS, &mut requested, &ctx)?;

    let total_items = state.db.count_clusters(&query).await?;
    let data = state.db.list_clusters(&query).await?;
    let meta = filters::list_meta(&requested, ALLOWED_FILTERS, limit, offset, total_items);

    Ok(HttpResponse::Ok().json(PagedResponse { data, meta }))
}
