use std::net::SocketAddr;

use actix_web::middleware::{Compress, Logger};
use actix_web::{web, App, HttpServer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::SharedState;

mod cluster;
mod cve;

#[derive(OpenApi)]
#[openapi(
    paths(crate::server::cve::list, crate::server::cluster::list),
    components(schemas(
        exposure_model::Cve,
        exposure_model::Cluster,
        exposure_model::Severity,
        exposure_model::ListMeta,
        exposure_model::PagedCves,
        exposure_model::PagedClusters,
        exposure_model::ErrorInformation,
    ))
)]
pub struct ApiDoc;

pub async fn run<B: Into<SocketAddr>>(state: SharedState, bind: B) -> Result<(), anyhow::Error> {
    let addr = bind.into();
    log::info!("listening on {}", addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(state.clone()))
            .configure(config)
    })
    .bind(addr)?
    .run()
    .await?;
    Ok(())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .wrap(Logger::default())
            .wrap(Compress::default())
            .service(cve::list)
            .service(cluster::list),
    )
    .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/openapi.json", ApiDoc::openapi()));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn openapi_document_lists_the_endpoints() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(doc["paths"]["/api/v1/cves"].get("get").is_some());
        assert!(doc["paths"]["/api/v1/clusters"].get("get").is_some());
        assert!(doc["components"]["schemas"].get("Severity").is_some());
    }
}
