// HTTP response utilities for file downloads
use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
};
use serde::Serialize;

/// Serialize `data` as pretty JSON and offer it as a file download
pub fn json_download<T: Serialize>(
    data: &T,
    file_name: &str,
) -> Result<Response<Body>, StatusCode> {
    let json = serde_json::to_vec_pretty(data).map_err(|e| {
        tracing::error!("Download serialization error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, json.len())
        .body(Body::from(json))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_headers() {
        let response = json_download(&serde_json::json!({"a": 1}), "export.json").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"export.json\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_invalid_file_name_is_rejected() {
        assert_eq!(
            json_download(&1, "bad\nname").unwrap_err(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
