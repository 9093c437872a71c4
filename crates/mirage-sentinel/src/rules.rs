//! Detection rule set: compiled patterns and source-address extraction.

use regex::Regex;
use serde_json::Value;

/// SQL-injection patterns, matched case-insensitively against the raw line
const SQLI_PATTERNS: [&str; 4] = [
    r"(?i)(union\s+select|select\s+.*\s+from|insert\s+into|delete\s+from|drop\s+table)",
    r"(?i)(or\s+1\s*=\s*1|'\s*or\s+'1'\s*=\s*'1)",
    r"(?i)(exec\s*\(|execute\s+immediate)",
    r"(?i)(\-\-|;--|/\*|\*/)",
];

/// Directory traversal, including URL-encoded forms
const PATH_TRAVERSAL_PATTERN: &str = r"(?i)(\.\./|\.\.\\|%2e%2e%2f|%2e%2e/|\.\.%2f)";

/// Dotted-quad fallback when the line is not structured JSON
const IP_PATTERN: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b";

/// Substrings marking a failed authentication attempt
const AUTH_FAILURE_MARKERS: [&str; 5] = [
    "401",
    "unauthorized",
    "authentication failed",
    "invalid credentials",
    "login failed",
];

/// Compiled detection rules. Built once at startup; a pattern that fails to
/// compile aborts the process.
pub struct RuleSet {
    sqli: Vec<Regex>,
    path_traversal: Regex,
    ip_fallback: Regex,
}

impl RuleSet {
    pub fn new() -> Result<Self, regex::Error> {
        let sqli = SQLI_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sqli,
            path_traversal: Regex::new(PATH_TRAVERSAL_PATTERN)?,
            ip_fallback: Regex::new(IP_PATTERN)?,
        })
    }

    pub fn matches_sqli(&self, line: &str) -> bool {
        self.sqli.iter().any(|re| re.is_match(line))
    }

    pub fn matches_path_traversal(&self, line: &str) -> bool {
        self.path_traversal.is_match(line)
    }

    pub fn is_auth_failure(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        AUTH_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// Pull the source address out of a log line: a structured `source_ip`
    /// field when the line parses as JSON, otherwise the first dotted quad.
    pub fn extract_source_ip(&self, line: &str) -> Option<String> {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
            if let Some(Value::String(ip)) = map.get("source_ip") {
                if !ip.is_empty() {
                    return Some(ip.clone());
                }
            }
        }

        self.ip_fallback
            .find(line)
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::new().unwrap()
    }

    #[test]
    fn test_sqli_keyword_sequences() {
        let r = rules();
        assert!(r.matches_sqli("GET /search?q=1 UNION SELECT password FROM users"));
        assert!(r.matches_sqli("id=1; DROP TABLE orders"));
        assert!(r.matches_sqli("name=' OR '1'='1"));
        assert!(r.matches_sqli("q=1 or 1=1"));
        assert!(r.matches_sqli("exec(xp_cmdshell)"));
    }

    #[test]
    fn test_sqli_comment_tokens() {
        let r = rules();
        // URL-encoded spaces defeat the keyword patterns, but the trailing
        // comment token still matches
        assert!(r.matches_sqli(
            r#"{"source_ip":"192.168.1.66","path":"/api/products?id=1'%20UNION%20SELECT%201--"}"#
        ));
        assert!(r.matches_sqli("id=1/* bypass */"));
    }

    #[test]
    fn test_sqli_negative() {
        let r = rules();
        assert!(!r.matches_sqli("GET /api/products?id=42"));
        assert!(!r.matches_sqli("selecting a product from the catalog page"));
    }

    #[test]
    fn test_path_traversal() {
        let r = rules();
        assert!(r.matches_path_traversal("GET /files?name=../../etc/passwd"));
        assert!(r.matches_path_traversal(r"GET /files?name=..\..\boot.ini"));
        assert!(r.matches_path_traversal("GET /files?name=%2e%2e%2fetc%2fpasswd"));
        assert!(r.matches_path_traversal("GET /files?name=..%2fsecret"));
        assert!(!r.matches_path_traversal("GET /files?name=report.pdf"));
    }

    #[test]
    fn test_auth_failure_markers() {
        let r = rules();
        assert!(r.is_auth_failure("POST /login 401"));
        assert!(r.is_auth_failure("Authentication Failed for user bob"));
        assert!(r.is_auth_failure("invalid credentials"));
        assert!(!r.is_auth_failure("POST /login 200"));
    }

    #[test]
    fn test_extract_source_ip_from_json() {
        let r = rules();
        let line = r#"{"source_ip":"192.168.1.66","path":"/api/products"}"#;
        assert_eq!(r.extract_source_ip(line).as_deref(), Some("192.168.1.66"));
    }

    #[test]
    fn test_extract_source_ip_regex_fallback() {
        let r = rules();
        let line = "plain access log 10.0.0.9 GET /index.html";
        assert_eq!(r.extract_source_ip(line).as_deref(), Some("10.0.0.9"));
    }

    #[test]
    fn test_extract_source_ip_none() {
        let r = rules();
        assert_eq!(r.extract_source_ip("no address in this line"), None);
        assert_eq!(r.extract_source_ip(r#"{"source_ip":""}"#), None);
    }
}
