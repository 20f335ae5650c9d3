//! Parsers for `jmap -histo:live` and `jcmd GC.heap_info` output.

use regex::Regex;
use std::sync::OnceLock;

/// Live instance count of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCount {
    pub class_name: String,
    pub instances: u64,
}

impl ClassCount {
    /// Class name without its package.
    pub fn short_name(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(self.class_name.as_str())
    }
}

/// Regex matching histogram lines that end with one of `classes`.
pub fn class_filter<S: AsRef<str>>(classes: &[S]) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = classes
        .iter()
        .map(|c| regex::escape(c.as_ref()))
        .collect();
    Regex::new(&format!("({})$", alternatives.join("|")))
}

/// Extracts the rows of a live histogram whose class matches `filter`.
///
/// Rows look like `  42:   1234   56789  org.keycloak.Foo`; the instance
/// count is the second column and the class the last one.
pub fn parse_histogram(text: &str, filter: &Regex) -> Vec<ClassCount> {
    text.lines()
        .map(str::trim)
        .filter(|line| filter.is_match(line))
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 3 {
                return None;
            }
            Some(ClassCount {
                instances: columns[1].parse().ok()?,
                class_name: columns[columns.len() - 1].to_string(),
            })
        })
        .collect()
}

fn heap_used_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"used (\d+)K\b").expect("valid heap pattern"))
}

/// First `used <N>K` figure of `GC.heap_info` output, in kilobytes.
pub fn parse_heap_used_kb(text: &str) -> Option<u64> {
    heap_used_pattern()
        .captures(text)
        .and_then(|c| c[1].parse().ok())
}

pub fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: [&str; 4] = [
        "DefaultKeycloakSession",
        "QuarkusKeycloakSession",
        "LDAPIdentityStore",
        "LDAPStorageProvider",
    ];

    const HISTOGRAM: &str = "\
 num     #instances         #bytes  class name (module)
-------------------------------------------------------
   1:        412345       38817216  [B (java.base@17.0.9)
 812:            57           4104  org.keycloak.quarkus.runtime.integration.QuarkusKeycloakSession
 901:            12            864  org.keycloak.storage.ldap.idm.store.ldap.LDAPIdentityStore
 902:            12            672  org.keycloak.storage.ldap.LDAPStorageProvider
 903:             3            144  org.keycloak.storage.ldap.LDAPStorageProviderFactory
Total       1234567      123456789
";

    #[test]
    fn test_parse_histogram_filters_classes() {
        let filter = class_filter(&CLASSES).unwrap();
        let rows = parse_histogram(HISTOGRAM, &filter);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].instances, 57);
        assert_eq!(rows[0].short_name(), "QuarkusKeycloakSession");
        assert_eq!(rows[2].short_name(), "LDAPStorageProvider");
        assert!(rows.iter().all(|r| r.short_name() != "LDAPStorageProviderFactory"));
    }

    #[test]
    fn test_parse_heap_used() {
        let text = " garbage-first heap   total 524288K, used 123456K [0x00000000e0000000, 0x0000000100000000)\n  region size 1024K, 60 young (61440K), 3 survivors (3072K)\n Metaspace       used 98765K, committed 99328K, reserved 1146880K\n";
        let kb = parse_heap_used_kb(text).unwrap();
        assert_eq!(kb, 123456);
        assert_eq!(format!("{:.2}", kb_to_mb(kb)), "123.46");
    }

    #[test]
    fn test_parse_heap_used_at_end_of_text() {
        assert_eq!(parse_heap_used_kb("used 123456K"), Some(123456));
    }

    #[test]
    fn test_parse_heap_used_missing() {
        assert_eq!(parse_heap_used_kb("Could not find any heap information"), None);
        assert_eq!(parse_heap_used_kb("used 12M"), None);
    }
}
