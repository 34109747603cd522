//! Consent-URL construction and authorization-code extraction.

/// Client registration fields that appear in the consent URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
}

fn strip_trailing_query_marker(url: &str) -> &str {
    url.trim().trim_end_matches('?')
}

/// Encodes the authorization-code consent URL the user opens in a browser.
pub fn encode_authorize_url(request: &AuthorizeRequest) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}",
        strip_trailing_query_marker(&request.authorize_url),
        urlencoding::encode(request.client_id.trim()),
        urlencoding::encode(request.redirect_uri.trim()),
        urlencoding::encode(request.scope.trim())
    )
}

/// Extracts the `code` query parameter from the URL the provider redirected to.
///
/// Accepts a full redirect URL or a bare query string. Returns `None` when the
/// redirect carries no code, for example after the user denied consent.
pub fn parse_authorization_code(redirected: &str) -> Option<String> {
    let raw = redirected.trim();
    let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
    let query = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(_, query)| query);

    for key_value in query.split('&') {
        let Some((key, value)) = key_value.split_once('=') else {
            continue;
        };
        if key != "code" {
            continue;
        }
        let decoded = urlencoding::decode(&value.replace('+', " ")).ok()?.to_string();
        let decoded = decoded.trim();
        return (!decoded.is_empty()).then(|| decoded.to_string());
    }
    None
}
