//! Request shaping for the Thanos query API usage samples are collected from.
//!
//! Every outbound query asks Thanos to deduplicate replicated series and to
//! fail instead of answering with a partial result.

use reqwest::{Client, Request, Response, Url};

const DEDUP: (&str, &str) = ("dedup", "true");
const PARTIAL_RESPONSE: (&str, &str) = ("partial_response", "false");

/// Sets `dedup=true` and `partial_response=false` on outbound requests,
/// replacing any value already present and keeping every other parameter.
#[derive(Debug, Clone, Default)]
pub struct ThanosRequestShaper {
    client: Client,
}

impl ThanosRequestShaper {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Rewrite the query string of `url` in place.
    pub fn shape_url(url: &mut Url) {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != DEDUP.0 && key != PARTIAL_RESPONSE.0)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(DEDUP.0, DEDUP.1)
            .append_pair(PARTIAL_RESPONSE.0, PARTIAL_RESPONSE.1);
    }

    pub fn shape(request: &mut Request) {
        Self::shape_url(request.url_mut());
    }

    /// Shape and send `request` with the wrapped client.
    pub async fn execute(&self, mut request: Request) -> reqwest::Result<Response> {
        Self::shape(&mut request);
        tracing::debug!(url = %request.url(), "querying thanos");
        self.client.execute(request).await
    }
}
