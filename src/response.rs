//! JSON body returned to the uploading client.

use crate::compositor::EncodedCutout;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// `{"mask": "<base64 png>"}` on success, `{"error": "..."}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CutoutResponse {
    Mask { mask: String },
    Error { error: String },
}

impl CutoutResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, CutoutResponse::Mask { .. })
    }
}

impl From<&Result<EncodedCutout>> for CutoutResponse {
    fn from(result: &Result<EncodedCutout>) -> Self {
        match result {
            Ok(encoded) => CutoutResponse::Mask {
                mask: encoded.to_base64(),
            },
            Err(e) => CutoutResponse::Error {
                error: e.user_message(),
            },
        }
    }
}
