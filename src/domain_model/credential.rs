/// Candidate tokens pulled off a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialBundle {
    /// Builds a bundle from the request's token slots. The bearer header wins
    /// over the access cookie; blank values count as absent.
    pub fn from_request_parts(
        bearer: Option<&str>,
        access_cookie: Option<&str>,
        refresh_cookie: Option<&str>,
    ) -> Self {
        let access_token = non_blank(bearer).or_else(|| non_blank(access_cookie));
        Self {
            access_token,
            refresh_token: non_blank(refresh_cookie),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_takes_precedence_over_cookie() {
        let bundle = CredentialBundle::from_request_parts(Some("hdr"), Some("cookie"), None);
        assert_eq!(bundle.access_token.as_deref(), Some("hdr"));
        assert_eq!(bundle.refresh_token, None);
    }

    #[test]
    fn access_cookie_used_without_header() {
        let bundle = CredentialBundle::from_request_parts(None, Some("cookie"), Some("r"));
        assert_eq!(bundle.access_token.as_deref(), Some("cookie"));
        assert_eq!(bundle.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn blank_values_count_as_absent() {
        let bundle = CredentialBundle::from_request_parts(Some(" "), Some(""), Some(""));
        assert!(bundle.is_empty());
    }
}
