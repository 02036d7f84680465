use axum::{
	Json, Router,
	extract::{FromRequestParts, Path, State},
	http::{
		HeaderMap, HeaderValue, StatusCode,
		header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
		request::Parts,
	},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use medex_service::{Error as ServiceError, ExportList, ExportRequestResponse, ExportView};

use crate::state::AppState;

/// Authenticated patient id, set by the upstream auth layer.
pub const HEADER_PATIENT_ID: &str = "x-medex-patient-id";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/patient/{patient_id}/export", post(request_export))
		.route("/patient/{patient_id}/exports", get(list_exports))
		.route("/export/{export_id}", get(export_status))
		.route("/download/export/{export_id}", get(download_export))
		.with_state(state)
}

/// The patient on whose behalf a request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
	pub patient_id: i64,
}
impl FromRequestParts<AppState> for Caller {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		if let Some(token) = state.service.cfg.security.api_auth_token.as_deref()
			&& !read_bearer_token(&parts.headers).is_some_and(|bearer| bearer == token)
		{
			return Err(json_error(
				StatusCode::UNAUTHORIZED,
				"unauthorized",
				"A valid Bearer token is required.",
			));
		}

		let patient_id = parts
			.headers
			.get(HEADER_PATIENT_ID)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.trim().parse::<i64>().ok())
			.ok_or_else(|| {
				json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Patient identity is required.")
			})?;

		Ok(Self { patient_id })
	}
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn request_export(
	State(state): State<AppState>,
	caller: Caller,
	Path(patient_id): Path<String>,
) -> Result<(StatusCode, Json<ExportRequestResponse>), ApiError> {
	let patient_id = parse_id(&patient_id, "patient_id")?;
	let response = state.service.request_export(caller.patient_id, patient_id).await?;

	if let Err(err) = state.queue.enqueue(response.export_id) {
		// The worker's pending sweep picks the record up later.
		tracing::warn!(export_id = response.export_id, error = %err, "Export left pending.");
	}

	Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn export_status(
	State(state): State<AppState>,
	caller: Caller,
	Path(export_id): Path<String>,
) -> Result<Json<ExportView>, ApiError> {
	let export_id = parse_id(&export_id, "export_id")?;
	let response = state.service.export_status(caller.patient_id, export_id).await?;

	Ok(Json(response))
}

async fn list_exports(
	State(state): State<AppState>,
	caller: Caller,
	Path(patient_id): Path<String>,
) -> Result<Json<ExportList>, ApiError> {
	let patient_id = parse_id(&patient_id, "patient_id")?;
	let response = state.service.list_exports(caller.patient_id, patient_id).await?;

	Ok(Json(response))
}

async fn download_export(
	State(state): State<AppState>,
	Path(export_id): Path<String>,
) -> Result<Response, ApiError> {
	let export_id = parse_id(&export_id, "export_id")?;
	let file = state.service.download_export(export_id).await?;
	let disposition = HeaderValue::from_str(&format!(
		"attachment; filename=\"{}\"",
		file.file_name.replace(['"', '\\'], "_")
	))
	.unwrap_or_else(|_| HeaderValue::from_static("attachment"));
	let mut headers = HeaderMap::new();

	headers.insert(CONTENT_TYPE, HeaderValue::from_static(file.content_type));
	headers.insert(CONTENT_DISPOSITION, disposition);

	Ok((headers, file.bytes).into_response())
}

fn parse_id(raw: &str, field: &str) -> Result<i64, ApiError> {
	raw.trim().parse::<i64>().ok().filter(|id| *id > 0).ok_or_else(|| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("{field} must be a positive integer."),
		)
	})
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message),
			ServiceError::Unauthorized { message } =>
				json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
			ServiceError::Forbidden { message } =>
				json_error(StatusCode::FORBIDDEN, "forbidden", message),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message),
			err @ ServiceError::NotReady { .. } =>
				json_error(StatusCode::BAD_REQUEST, "not_ready", err.to_string()),
			err @ ServiceError::Expired => json_error(StatusCode::GONE, "expired", err.to_string()),
			ServiceError::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "conflict", message),
			err @ ServiceError::InvalidTransition(_) =>
				json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
			err @ (ServiceError::Storage { .. }
			| ServiceError::Provider { .. }
			| ServiceError::Io { .. }
			| ServiceError::Internal { .. }) => {
				tracing::error!(error = %err, "Request failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal server error.")
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
) -> ApiError {
	ApiError::new(status, code, message)
}

#[cfg(test)]
mod tests {
	use medex_domain::export::ExportStatus;

	use super::*;

	fn bearer(value: &'static str) -> HeaderMap {
		let mut headers = HeaderMap::new();

		headers.insert(AUTHORIZATION, HeaderValue::from_static(value));

		headers
	}

	#[test]
	fn bearer_token_is_read_from_the_authorization_header() {
		assert_eq!(read_bearer_token(&bearer("Bearer token-a")), Some("token-a"));
		assert_eq!(read_bearer_token(&bearer("  Bearer token-a  ")), Some("token-a"));
		assert_eq!(read_bearer_token(&bearer("Basic token-a")), None);
		assert_eq!(read_bearer_token(&bearer("Bearer ")), None);
		assert_eq!(read_bearer_token(&HeaderMap::new()), None);
		assert!(read_bearer_token(&bearer("Bearer token-a")).is_some_and(|token| token != "token"));
	}

	#[test]
	fn ids_must_be_positive_integers() {
		assert_eq!(parse_id(" 42 ", "export_id").ok(), Some(42));
		assert_eq!(parse_id("0", "export_id").map_err(|err| err.status()), Err(StatusCode::BAD_REQUEST));
		assert!(parse_id("abc", "export_id").is_err());
	}

	#[test]
	fn service_errors_map_to_statuses() {
		let cases = [
			(ServiceError::Expired, StatusCode::GONE),
			(ServiceError::NotReady { status: ExportStatus::Pending }, StatusCode::BAD_REQUEST),
			(ServiceError::Storage { message: "db down".to_string() }, StatusCode::INTERNAL_SERVER_ERROR),
			(ServiceError::Conflict { message: "claimed".to_string() }, StatusCode::CONFLICT),
		];

		for (err, status) in cases {
			assert_eq!(ApiError::from(err).status(), status);
		}
	}
}
