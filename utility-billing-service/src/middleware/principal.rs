use crate::models::{Principal, StaffRole};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const STAFF_ID_HEADER: &str = "X-Staff-ID";
pub const STAFF_NAME_HEADER: &str = "X-Staff-Name";
pub const STAFF_ROLE_HEADER: &str = "X-Staff-Role";

/// Staff identity set by the session layer in front of this service.
/// Any of the three headers missing means the caller is not signed in.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = required_header(parts, STAFF_ID_HEADER)?.to_string();
        let display_name = required_header(parts, STAFF_NAME_HEADER)?.to_string();
        let raw_role = required_header(parts, STAFF_ROLE_HEADER)?;
        let role = StaffRole::parse(raw_role).ok_or_else(|| {
            AppError::Forbidden(anyhow::anyhow!("Unknown staff role '{}'", raw_role))
        })?;

        tracing::Span::current().record("staff_id", id.as_str());

        Ok(Principal::new(id, display_name, role))
    }
}

fn required_header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Principal, AppError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_principal_from_headers() {
        let principal = extract(&[
            (STAFF_ID_HEADER, "7"),
            (STAFF_NAME_HEADER, "Maria Santos"),
            (STAFF_ROLE_HEADER, "bill handler"),
        ])
        .await
        .unwrap();

        assert_eq!(principal.display_name, "Maria Santos");
        assert_eq!(principal.role, StaffRole::BillHandler);
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let err = extract(&[(STAFF_ID_HEADER, "7")]).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
