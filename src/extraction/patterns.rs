//! Pattern rules over the free text of a contact card.
//!
//! Every rule works line by line on the trimmed card text and records the
//! lines it claims, so later rules (and the work-info heuristic) never read the
//! same line twice.

use crate::config::ExtractionConfig;
use crate::error::ScoutError;
use crate::types::FieldKind;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Output of the pattern pass, before consolidation with structured values.
#[derive(Debug, Default)]
pub(crate) struct PatternScan {
    pub values: BTreeMap<FieldKind, String>,
    /// Line indices claimed by a rule.
    pub consumed: BTreeSet<usize>,
}

impl PatternScan {
    pub fn claim(&mut self, kind: FieldKind, value: impl Into<String>, line: usize) {
        self.values.entry(kind).or_insert_with(|| value.into());
        self.consumed.insert(line);
    }

    pub fn has(&self, kind: FieldKind) -> bool {
        self.values.contains_key(&kind)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PatternRules {
    email: Regex,
    sip: Regex,
    generic_mailbox: Option<Regex>,
    digit_run: Regex,
    token: Regex,
    postal_code: Regex,
    postal_city: Regex,
    full_name: Regex,
    street_markers: Vec<String>,
    phone_digits: usize,
}

fn compile(pattern: &str) -> Result<Regex, ScoutError> {
    Regex::new(pattern)
        .map_err(|e| ScoutError::Configuration(format!("invalid extraction pattern: {}", e)))
}

impl PatternRules {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ScoutError> {
        let prefixes: Vec<String> = config
            .generic_mailbox_prefixes
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();
        let generic_mailbox = if prefixes.is_empty() {
            None
        } else {
            Some(compile(&format!(r"(?i)^(?:{})\d+@", prefixes.join("|")))?)
        };

        let name_upper = r"\p{Lu}[\p{Lu}'’\-]*";
        let name_given = r"\p{Lu}[\p{L}'’\-]*";
        let full_name = format!(
            r"^{u}(?:\s+{u})*(?:\s*,\s*{u}(?:\s+{u})*)?\s*,\s*{g}(?:\s+{g})*$",
            u = name_upper,
            g = name_given
        );

        Ok(Self {
            email: compile(r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b")?,
            sip: compile(r"(?i)\bsip:\s*([A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,})\b")?,
            generic_mailbox,
            digit_run: compile(r"\+?\d(?:[ .\-]?\d)*")?,
            token: compile(r"[^\s,;]+")?,
            postal_code: compile(r"\b\d{5}\b")?,
            postal_city: compile(r"^\d{5}\s+\p{Lu}[\p{Lu}\s.'\-]*$")?,
            full_name: compile(&full_name)?,
            street_markers: config
                .street_markers
                .iter()
                .map(|m| m.trim().to_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
            phone_digits: config.phone_digits,
        })
    }

    /// Run every rule over `lines`. Rule order matters: SIP and postal lines
    /// are claimed before the phone rule looks for digit runs.
    pub fn scan(&self, lines: &[&str]) -> PatternScan {
        let mut scan = PatternScan::default();
        self.sip(lines, &mut scan);
        self.email(lines, &mut scan);
        self.postal(lines, &mut scan);
        self.phone(lines, &mut scan);
        self.full_name(lines, &mut scan);
        scan
    }

    fn sip(&self, lines: &[&str], scan: &mut PatternScan) {
        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = self.sip.captures(line) {
                scan.claim(FieldKind::SipAddress, format!("sip:{}", &caps[1]), i);
            }
        }
    }

    fn email(&self, lines: &[&str], scan: &mut PatternScan) {
        let mut fallback: Option<String> = None;
        for line in lines {
            let sip_spans: Vec<_> = self.sip.find_iter(line).map(|m| m.range()).collect();
            for m in self.email.find_iter(line) {
                if sip_spans.iter().any(|span| span.contains(&m.start())) {
                    continue;
                }
                let candidate = m.as_str();
                let generic = self
                    .generic_mailbox
                    .as_ref()
                    .is_some_and(|re| re.is_match(candidate));
                if !generic {
                    scan.values
                        .insert(FieldKind::PersonalEmail, candidate.to_string());
                    return;
                }
                if fallback.is_none() {
                    fallback = Some(candidate.to_string());
                }
            }
        }
        if let Some(generic) = fallback {
            tracing::debug!("extraction: only generic mailbox found ({})", generic);
            scan.values.insert(FieldKind::PersonalEmail, generic);
        }
    }

    fn postal(&self, lines: &[&str], scan: &mut PatternScan) {
        for (i, line) in lines.iter().enumerate() {
            if scan.consumed.contains(&i) || !is_upper_line(line) {
                continue;
            }
            if let Some(marker_end) = self.street_marker_end(line) {
                if self.postal_code.is_match(&line[marker_end..]) {
                    scan.claim(FieldKind::PostalAddress, *line, i);
                    return;
                }
            }
        }
        for (i, line) in lines.iter().enumerate() {
            if !scan.consumed.contains(&i) && self.postal_city.is_match(line) {
                scan.claim(FieldKind::PostalAddress, *line, i);
                return;
            }
        }
    }

    /// Byte offset just past the first street-marker token of `line`.
    fn street_marker_end(&self, line: &str) -> Option<usize> {
        self.token.find_iter(line).find_map(|m| {
            let token = m.as_str();
            let bare = token.trim_end_matches('.');
            let hit = self.street_markers.iter().any(|marker| {
                bare == marker.trim_end_matches('.')
                    || ((marker.ends_with('/') || marker.ends_with('.'))
                        && token.starts_with(marker.as_str()))
            });
            hit.then_some(m.end())
        })
    }

    fn phone(&self, lines: &[&str], scan: &mut PatternScan) {
        for (i, line) in lines.iter().enumerate() {
            if scan.consumed.contains(&i) {
                continue;
            }
            for m in self.digit_run.find_iter(line) {
                let before = line[..m.start()].chars().next_back();
                let after = line[m.end()..].chars().next();
                if before.is_some_and(glued) || after.is_some_and(glued) {
                    continue;
                }
                if let Some(number) = self.phone_from_run(m.as_str()) {
                    scan.claim(FieldKind::WorkPhone, number, i);
                    return;
                }
            }
        }
    }

    fn phone_from_run(&self, run: &str) -> Option<String> {
        let digits: String = run.chars().filter(char::is_ascii_digit).collect();
        let n = self.phone_digits;
        if digits.len() == n {
            return Some(digits);
        }
        // +CC prefix: keep the national part
        if run.starts_with('+') && digits.len() > n && digits.len() <= n + 3 {
            return Some(digits[digits.len() - n..].to_string());
        }
        None
    }

    fn full_name(&self, lines: &[&str], scan: &mut PatternScan) {
        for (i, line) in lines.iter().enumerate() {
            if !scan.consumed.contains(&i) && self.full_name.is_match(line) {
                scan.claim(FieldKind::FullName, *line, i);
                return;
            }
        }
    }
}

/// Characters that make a digit run part of a larger token (ids, mailboxes).
fn glued(c: char) -> bool {
    c.is_alphanumeric() || c == '@' || c == '_' || c == '/'
}

/// Has at least one letter and no lowercase letters.
pub(crate) fn is_upper_line(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> PatternRules {
        PatternRules::new(&ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn phone_ignores_separators_and_country_prefix() {
        let r = rules();
        assert_eq!(r.phone_from_run("91 670 40 92").as_deref(), Some("916704092"));
        assert_eq!(r.phone_from_run("+34 916.704.092").as_deref(), Some("916704092"));
        assert_eq!(r.phone_from_run("28001"), None);
        assert_eq!(r.phone_from_run("9167040921234"), None);
    }

    #[test]
    fn phone_skips_digits_inside_mailboxes() {
        let r = rules();
        let scan = r.scan(&["ASP123456789@madrid.org"]);
        assert!(!scan.has(FieldKind::WorkPhone));
    }

    #[test]
    fn street_marker_accepts_glued_and_dotted_forms() {
        let r = rules();
        assert!(r.street_marker_end("C/MAYOR 1 28001 MADRID").is_some());
        assert!(r.street_marker_end("AVDA. DE AMERICA 5 28002 MADRID").is_some());
        assert!(r.street_marker_end("EDIFICIO CENTRAL").is_none());
    }

    #[test]
    fn upper_line_detection() {
        assert!(is_upper_line("C/ MAYOR, 1 28001 MADRID"));
        assert!(!is_upper_line("Trabajo"));
        assert!(!is_upper_line("916704092"));
    }
}
