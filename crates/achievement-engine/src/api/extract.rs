//! 请求头提取器

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// 租户标识，缺失或为空时返回 400
#[derive(Debug, Clone)]
pub struct TenantId(pub String);

impl<St: Send + Sync> FromRequestParts<St> for TenantId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        header_value(parts, TENANT_HEADER)
            .map(TenantId)
            .ok_or(ApiError::MissingTenant)
    }
}

/// 操作人，写入事件信封与颁发记录
#[derive(Debug, Clone, Default)]
pub struct Actor(pub Option<String>);

impl Actor {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<St: Send + Sync> FromRequestParts<St> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Ok(Actor(header_value(parts, ACTOR_HEADER)))
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_tenant_header_required() {
        let mut p = parts(&[]);
        let err = TenantId::from_request_parts(&mut p, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingTenant));

        let mut p = parts(&[("X-Tenant-Id", "  ")]);
        assert!(TenantId::from_request_parts(&mut p, &()).await.is_err());

        let mut p = parts(&[("X-Tenant-Id", "acme")]);
        let TenantId(tenant) = TenantId::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(tenant, "acme");
    }

    #[tokio::test]
    async fn test_actor_is_optional() {
        let mut p = parts(&[]);
        assert!(Actor::from_request_parts(&mut p, &()).await.unwrap().0.is_none());

        let mut p = parts(&[("X-Actor-Id", "admin")]);
        let actor = Actor::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(actor.as_deref(), Some("admin"));
    }
}
