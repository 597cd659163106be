use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use exposure_model::ErrorInformation;

use crate::filters::FilterError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl actix_web::error::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Filter(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());
        res.insert_header(ContentType::json());
        match self {
            Self::Filter(error) => res.json(ErrorInformation {
                error: "Filter".to_string(),
                message: "Invalid filter parameters".to_string(),
                details: error.to_string(),
            }),
            Self::Database(error) => res.json(ErrorInformation {
                error: "Database".to_string(),
                message: "Error querying the database".to_string(),
                details: error.to_string(),
            }),
        }
    }
}
