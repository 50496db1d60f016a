use crate::validation::ValidationError;
use log::error;
use mongodb::error::Error as MongoError;
use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Debug)]
pub enum ErrorType {
    BadRequest,
    Unauthorized,
    NotFound,
    Internal,
}

#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub err_type: ErrorType,
}

impl AppError {
    pub fn unauthorized(message: &str) -> Self {
        AppError {
            message: message.to_string(),
            err_type: ErrorType::Unauthorized,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        AppError {
            message: message.to_string(),
            err_type: ErrorType::BadRequest,
        }
    }

    fn status(&self) -> StatusCode {
        match self.err_type {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Reject for AppError {}

#[derive(Debug)]
pub struct MongoRejection(pub MongoError);

impl Reject for MongoRejection {}

#[derive(Debug)]
pub struct ValidationRejection(pub ValidationError);

impl Reject for ValidationRejection {}

#[derive(Serialize)]
struct ErrorMessage {
    error: String,
}

/// Maps every rejection coming out of the filters to a single JSON error
/// body with the matching status code.
pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(e) = err.find::<ValidationRejection>() {
        let json = warp::reply::json(&serde_json::json!({ "error": &e.0 }));
        return Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST));
    }

    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<AppError>() {
        (e.status(), e.message.clone())
    } else if let Some(e) = err.find::<MongoRejection>() {
        error!("database error: {}", e.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Bad query".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    };

    let json = warp::reply::json(&ErrorMessage { error: message });
    Ok(warp::reply::with_status(json, code))
}
