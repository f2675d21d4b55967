//! `WWW-Authenticate` challenge values (RFC 6750 §3, RFC 9728 §5.1)

/// Renders `Bearer` challenges that point clients at the protected-resource
/// metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WwwAuthenticateBuilder {
    resource_metadata_url: String,
}

impl WwwAuthenticateBuilder {
    pub fn new(resource_metadata_url: impl Into<String>) -> Self {
        Self {
            resource_metadata_url: resource_metadata_url.into(),
        }
    }

    pub fn resource_metadata_url(&self) -> &str {
        &self.resource_metadata_url
    }

    /// Build a header value such as
    ///
    /// ```text
    /// Bearer realm="https://mcp.example.com" error="invalid_token" error_description="The access token has expired" resource_metadata_url="https://mcp.example.com/.well-known/oauth-protected-resource"
    /// ```
    ///
    /// Empty segments are left out.
    pub fn build(&self, realm: &str, error: &str, error_description: &str) -> String {
        let mut parts = vec!["Bearer".to_string()];

        for (name, value) in [
            ("realm", realm),
            ("error", error),
            ("error_description", error_description),
            ("resource_metadata_url", self.resource_metadata_url.as_str()),
        ] {
            if !value.is_empty() {
                parts.push(format!("{name}=\"{}\"", quote(value)));
            }
        }

        parts.join(" ")
    }
}

/// Escape for an HTTP quoted-string
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "https://mcp.example.com/.well-known/oauth-protected-resource";

    #[test]
    fn test_full_challenge() {
        let header = WwwAuthenticateBuilder::new(METADATA).build(
            "https://mcp.example.com",
            "invalid_token",
            "The access token has expired",
        );
        assert_eq!(
            header,
            "Bearer realm=\"https://mcp.example.com\" error=\"invalid_token\" \
             error_description=\"The access token has expired\" \
             resource_metadata_url=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
        );
    }

    #[test]
    fn test_empty_segments_omitted() {
        let builder = WwwAuthenticateBuilder::new(METADATA);
        assert_eq!(
            builder.build("", "", ""),
            format!("Bearer resource_metadata_url=\"{METADATA}\"")
        );
        assert_eq!(
            WwwAuthenticateBuilder::default().build("api", "invalid_request", ""),
            "Bearer realm=\"api\" error=\"invalid_request\""
        );
        assert_eq!(WwwAuthenticateBuilder::default().build("", "", ""), "Bearer");
    }

    #[test]
    fn test_quotes_escaped() {
        let header = WwwAuthenticateBuilder::default().build("", "invalid_token", "bad \"kid\"");
        assert_eq!(
            header,
            "Bearer error=\"invalid_token\" error_description=\"bad \\\"kid\\\"\""
        );
    }
}
