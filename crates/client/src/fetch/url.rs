//! Page-supplied URLs resolved against the origin.

use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
}

/// Resolve a URL the page asked for.
///
/// A path starting with a single `/` is joined to `base`. Anything else is
/// absolute, with `https` assumed when no scheme is given. Only `http` and
/// `https` are accepted, and the fragment never reaches the origin.
pub fn resolve(base: &Url, input: &str) -> Result<Url, UrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut url = if input.starts_with('/') && !input.starts_with("//") {
        base.join(input)?
    } else if input.contains("://") {
        Url::parse(input)?
    } else {
        Url::parse(&format!("https://{input}"))?
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.set_fragment(None);
    Ok(url)
}
