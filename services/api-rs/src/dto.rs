use serde::Deserialize;

/// Body for `POST /`.
#[derive(Debug, Deserialize)]
pub struct StoreUrlRequest {
    pub url: String,
    pub shortcode: String,
}
