//! Shared response envelope types for API handlers.

use serde::{Deserialize, Serialize};

/// Standard `{ "data": T }` response envelope for list endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}
