use regex::Regex;

/// Signature patterns screened against the URL path.
///
/// This is a heuristic blocklist for automated-scanner noise, not a parser:
/// the framework's own escaping and parameterization remain the real
/// injection defense downstream.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"\.\./",                 // Path traversal
    r"\.\.\\",                // Windows path traversal
    r"(?i)%2e%2e[%2f/\\]",    // Encoded path traversal
    r"%00",                   // Null byte
    r"\x00",                  // Null byte (raw)
    r"(?i)<script",           // XSS in URL
    r"(?i)javascript:",       // JavaScript protocol
    r"(?i)vbscript:",         // VBScript protocol
    r"(?i)data:",             // Data protocol
];

/// Basic SQL injection signatures, checked against the query string only.
/// Legitimate path slugs may contain apostrophes or dashes, so the path is
/// deliberately excluded.
const SQL_PATTERNS: &[&str] = &[
    r"(?i)(%27)|(')|(--)|(%23)|(#)",
    r"(?i)((%3D)|(=))[^\n]*((%27)|(')|(--)|(%3B)|(;))",
    r"(?i)\w*((%27)|('))((%6F)|o|(%4F))((%72)|r|(%52))",
    r"(?i)((%27)|('))union",
];

/// Host header character allowlist: alphanumerics, dot, dash, colon
const HOST_PATTERN: &str = r"^[\w\-\.:]+$";

/// A detected request violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// URL exceeds the configured maximum length
    UrlTooLong,
    /// Path matches an attack signature
    SuspiciousPath,
    /// Query string matches a SQL injection signature
    SqlInjection,
    /// Host header contains disallowed characters
    SuspiciousHost,
}

impl Violation {
    /// Generic client-facing message; never echoes the offending input
    pub fn public_message(&self) -> &'static str {
        match self {
            Violation::UrlTooLong => "URL too long",
            _ => "Invalid request",
        }
    }

    /// Stable label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Violation::UrlTooLong => "url_too_long",
            Violation::SuspiciousPath => "suspicious_path",
            Violation::SqlInjection => "sql_injection",
            Violation::SuspiciousHost => "suspicious_host",
        }
    }
}

/// Screens requests for known attack signatures before any handler runs
pub struct RequestValidator {
    max_url_length: usize,
    suspicious_patterns: Vec<Regex>,
    sql_patterns: Vec<Regex>,
    host_pattern: Regex,
}

impl RequestValidator {
    /// Create a validator with the configured maximum URL length
    pub fn new(max_url_length: usize) -> Self {
        Self {
            max_url_length,
            suspicious_patterns: compile(SUSPICIOUS_PATTERNS),
            sql_patterns: compile(SQL_PATTERNS),
            host_pattern: Regex::new(HOST_PATTERN).expect("built-in host pattern must compile"),
        }
    }

    /// Validate a request's path, query string and host header.
    ///
    /// Checks run in order: URL length, path signatures, query string SQL
    /// signatures, host header allowlist. The first violation wins.
    pub fn validate(&self, path: &str, query: &str, host: &str) -> Result<(), Violation> {
        let full_length = if query.is_empty() {
            path.len()
        } else {
            path.len() + 1 + query.len()
        };
        if full_length > self.max_url_length {
            return Err(Violation::UrlTooLong);
        }

        for pattern in &self.suspicious_patterns {
            if pattern.is_match(path) {
                return Err(Violation::SuspiciousPath);
            }
        }

        if !query.is_empty() {
            for pattern in &self.sql_patterns {
                if pattern.is_match(query) {
                    return Err(Violation::SqlInjection);
                }
            }
        }

        if !host.is_empty() && !self.host_pattern.is_match(host) {
            return Err(Violation::SuspiciousHost);
        }

        Ok(())
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in request pattern must compile"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RequestValidator {
        RequestValidator::new(2048)
    }

    #[test]
    fn test_clean_request_passes() {
        assert!(validator()
            .validate("/blog/posts/rust-at-the-edge", "page=2", "example.com")
            .is_ok());
    }

    #[test]
    fn test_path_traversal_rejected() {
        assert_eq!(
            validator().validate("/static/../../etc/passwd", "", ""),
            Err(Violation::SuspiciousPath)
        );
        assert_eq!(
            validator().validate("/files/%2e%2e%2fsecret", "", ""),
            Err(Violation::SuspiciousPath)
        );
    }

    #[test]
    fn test_null_byte_rejected() {
        assert_eq!(
            validator().validate("/download/file%00.jpg", "", ""),
            Err(Violation::SuspiciousPath)
        );
    }

    #[test]
    fn test_script_markers_rejected() {
        assert_eq!(
            validator().validate("/search/<script>alert(1)</script>", "", ""),
            Err(Violation::SuspiciousPath)
        );
        assert_eq!(
            validator().validate("/redirect/javascript:alert(1)", "", ""),
            Err(Violation::SuspiciousPath)
        );
    }

    #[test]
    fn test_sql_injection_in_query_rejected() {
        assert_eq!(
            validator().validate("/products", "id=1'--", ""),
            Err(Violation::SqlInjection)
        );
        assert_eq!(
            validator().validate("/products", "q=%27union%20select", ""),
            Err(Violation::SqlInjection)
        );
    }

    #[test]
    fn test_apostrophe_in_path_is_not_sql_injection() {
        // Slugs like /rock-n-roll-o'clock must not trip the SQL check,
        // which only applies to the query string
        assert!(validator().validate("/blog/o'clock-stories", "", "").is_ok());
    }

    #[test]
    fn test_url_length_limit() {
        let validator = RequestValidator::new(64);
        let long_path = format!("/{}", "a".repeat(100));
        assert_eq!(
            validator.validate(&long_path, "", ""),
            Err(Violation::UrlTooLong)
        );
        assert!(validator.validate("/short", "", "").is_ok());
    }

    #[test]
    fn test_query_counts_toward_length() {
        let validator = RequestValidator::new(16);
        assert_eq!(
            validator.validate("/short", &"x".repeat(20), ""),
            Err(Violation::UrlTooLong)
        );
    }

    #[test]
    fn test_host_header_allowlist() {
        assert!(validator().validate("/", "", "example.com:8080").is_ok());
        assert_eq!(
            validator().validate("/", "", "evil host"),
            Err(Violation::SuspiciousHost)
        );
        assert_eq!(
            validator().validate("/", "", "example.com\"><script>"),
            Err(Violation::SuspiciousHost)
        );
        // Empty host is left to the framework
        assert!(validator().validate("/", "", "").is_ok());
    }
}
