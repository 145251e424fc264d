//! Bearer credential decoration.

use super::{AUTHORIZATION, ApiRequest};

/// Returns `request` carrying `Authorization: Bearer <token>` if a token is
/// present, or the request unmodified otherwise.
pub fn attach_bearer(mut request: ApiRequest, token: Option<&str>) -> ApiRequest {
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        request.set_header(AUTHORIZATION, format!("Bearer {token}"));
    }
    request
}
