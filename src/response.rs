use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenResponse {
    pub short_code: String,
}

impl ShortenResponse {
    pub fn new(short_code: String) -> Self {
        Self { short_code }
    }
}
