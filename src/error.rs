use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::moderation::ModerationResult;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_words: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] Forbidden(String),
    #[error("not found")] NotFound,
    #[error("content rejected by moderation")] Rejected(ModerationResult),
    #[error("too many requests")] TooManyRequests,
    #[error("{0}")] BadGateway(String),
    #[error("{0}")] Unavailable(String),
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict(msg) => ApiError::BadRequest(msg),
            RepoError::Internal(msg) => {
                tracing::error!("store error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    /// Reports one message; fields are visited in name order.
    fn from(errs: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errs.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let msg = fields
            .into_iter()
            .find_map(|(field, list)| {
                list.first().map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .unwrap_or_else(|| "Invalid input".to_string());
        ApiError::BadRequest(msg)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Rejected(result) => ApiErrorBody {
                error: self.to_string(),
                reason: result.reason.clone(),
                flagged_words: result.flagged_words.clone(),
            },
            _ => ApiErrorBody { error: self.to_string(), reason: None, flagged_words: None },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    fn body_json(err: ApiError) -> (u16, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status().as_u16();
        let bytes = resp.into_body().try_into_bytes().unwrap_or_default();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn conflict_maps_to_bad_request_with_message() {
        let (status, v) = body_json(RepoError::Conflict("Email already registered".into()).into());
        assert_eq!(status, 400);
        assert_eq!(v["error"], "Email already registered");
    }

    #[test]
    fn rejection_carries_flagged_words() {
        let reason = "Content contains inappropriate language";
        let result = ModerationResult::rejected(reason, vec!["fuck".into()]);
        let (status, v) = body_json(ApiError::Rejected(result));
        assert_eq!(status, 400);
        assert_eq!(v["flaggedWords"][0], "fuck");
        assert!(v["reason"].as_str().unwrap().contains("inappropriate"));
    }

    #[test]
    fn validation_reports_first_field_by_name() {
        use validator::{ValidationError, ValidationErrors};
        let mut errs = ValidationErrors::new();
        let too_long =
            ValidationError::new("length").with_message("Title must be 1-200 characters".into());
        errs.add("title", too_long);
        errs.add("content", ValidationError::new("length"));
        let (status, v) = body_json(errs.into());
        assert_eq!(status, 400);
        assert_eq!(v["error"], "content is invalid");
    }

    #[test]
    fn internal_hides_details() {
        let (status, v) = body_json(RepoError::Internal("pool timed out".into()).into());
        assert_eq!(status, 500);
        assert_eq!(v["error"], "internal error");
        assert!(v.get("reason").is_none());
    }
}
