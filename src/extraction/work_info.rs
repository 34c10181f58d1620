//! Department / company / office classification.
//!
//! Labelled lines (`Departamento: …`, `Company: …`) win. Remaining standalone
//! all-caps lines are assigned in layout order to company, department and
//! office location, skipping kinds a label already filled.

use super::patterns::{is_upper_line, PatternScan};
use crate::config::ExtractionConfig;
use crate::error::ScoutError;
use crate::types::FieldKind;
use regex::Regex;

const HEURISTIC_ORDER: [FieldKind; 3] = [
    FieldKind::Company,
    FieldKind::Department,
    FieldKind::OfficeLocation,
];

#[derive(Debug, Clone)]
pub(crate) struct WorkInfoRules {
    label: Regex,
    ignored_headings: Vec<String>,
}

impl WorkInfoRules {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ScoutError> {
        let label = Regex::new(
            r"(?i)^(departamento|department|t[íi]tulo|puesto|cargo|job title|title|compa[ñn][íi]a|empresa|organizaci[óo]n|company|organization|oficina|ubicaci[óo]n|localizaci[óo]n|office|location)\s*:\s*(\S.*)$",
        )
        .map_err(|e| ScoutError::Configuration(format!("invalid label pattern: {}", e)))?;
        Ok(Self {
            label,
            ignored_headings: config
                .ignored_headings
                .iter()
                .map(|h| h.trim().to_uppercase())
                .collect(),
        })
    }

    pub fn classify(&self, lines: &[&str], scan: &mut PatternScan) {
        for (i, line) in lines.iter().enumerate() {
            if scan.consumed.contains(&i) {
                continue;
            }
            if let Some(caps) = self.label.captures(line) {
                let value = caps[2].trim();
                match label_kind(&caps[1]) {
                    Some(kind) if !scan.has(kind) && !value.is_empty() => {
                        scan.claim(kind, value, i);
                    }
                    // role lines and repeats are never work-info values
                    _ => {
                        scan.consumed.insert(i);
                    }
                }
            }
        }

        let open: Vec<FieldKind> = HEURISTIC_ORDER
            .iter()
            .filter(|k| !scan.has(**k))
            .copied()
            .collect();
        let candidates: Vec<(usize, &str)> = lines
            .iter()
            .enumerate()
            .filter(|(i, line)| !scan.consumed.contains(i) && self.is_standalone_heading(line))
            .map(|(i, line)| (i, *line))
            .collect();

        for ((i, line), kind) in candidates.into_iter().zip(open) {
            tracing::debug!("extraction: heuristic {} <- '{}'", kind, line);
            scan.claim(kind, line, i);
        }
    }

    fn is_standalone_heading(&self, line: &str) -> bool {
        if line.chars().count() <= 3 || line.contains('@') || !is_upper_line(line) {
            return false;
        }
        let heading = line.trim_end_matches(':').trim();
        !self.ignored_headings.iter().any(|h| h == heading)
    }
}

/// `None` for job-title labels: a role is not a department.
fn label_kind(label: &str) -> Option<FieldKind> {
    match label.to_lowercase().as_str() {
        "departamento" | "department" => Some(FieldKind::Department),
        "compañía" | "compañia" | "compania" | "companía" | "empresa" | "organización"
        | "organizacion" | "company" | "organization" => Some(FieldKind::Company),
        "oficina" | "ubicación" | "ubicacion" | "localización" | "localizacion" | "office"
        | "location" => Some(FieldKind::OfficeLocation),
        _ => None,
    }
}
