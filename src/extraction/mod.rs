//! Field extraction engine.
//!
//! `FieldExtractor::consolidate` merges the selector-sourced values of a
//! [`RawPopupCapture`] with pattern matches over its free text. Per field:
//! a non-empty structured value wins, then a pattern match, else the field is
//! absent. No I/O and no clock: the same capture always yields the same
//! [`ExtractedFields`].

mod patterns;
mod work_info;

use crate::config::ExtractionConfig;
use crate::error::ScoutError;
use crate::types::{ExtractedFields, FieldKind, Provenance, RawPopupCapture};
use patterns::PatternRules;
use std::collections::BTreeMap;
use work_info::WorkInfoRules;

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rules: PatternRules,
    work_info: WorkInfoRules,
}

impl FieldExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ScoutError> {
        Ok(Self {
            rules: PatternRules::new(config)?,
            work_info: WorkInfoRules::new(config)?,
        })
    }

    /// Pattern-rule values only, keyed by kind.
    pub fn scan_text(&self, text: &str) -> BTreeMap<FieldKind, String> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut scan = self.rules.scan(&lines);
        self.work_info.classify(&lines, &mut scan);
        scan.values
    }

    pub fn consolidate(&self, capture: &RawPopupCapture) -> ExtractedFields {
        let mut fields = ExtractedFields::default();
        let pattern = if capture.full_text.trim().is_empty() {
            BTreeMap::new()
        } else {
            self.scan_text(&capture.full_text)
        };

        for kind in FieldKind::ALL {
            let structured = capture
                .structured_values
                .get(&kind)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty());
            if let Some(value) = structured {
                fields.set(kind, value.to_string(), Provenance::Structured);
            } else if let Some(value) = pattern.get(&kind) {
                fields.set(kind, value.clone(), Provenance::Pattern);
            }
        }
        fields
    }
}

/// Normalise a raw selector read before it enters a capture.
///
/// Strips `mailto:` / `tel:` link schemes and rejects placeholders that only
/// repeat the field label (an empty `Name` slot renders as "name").
pub fn clean_structured_value(kind: FieldKind, raw: &str) -> Option<String> {
    let mut text = raw.trim();
    for scheme in ["mailto:", "tel:"] {
        if let Some(head) = text.get(..scheme.len()) {
            if head.eq_ignore_ascii_case(scheme) {
                text = text[scheme.len()..].trim();
            }
        }
    }
    if text.is_empty() {
        return None;
    }
    let placeholders: &[&str] = match kind {
        FieldKind::FullName => &["name", "nombre"],
        FieldKind::PersonalEmail => &["email", "correo"],
        FieldKind::WorkPhone => &["phone", "teléfono"],
        FieldKind::SipAddress => &["sip"],
        FieldKind::PostalAddress => &["address", "dirección"],
        FieldKind::Department => &["department", "departamento"],
        FieldKind::Company => &["company", "compañía"],
        FieldKind::OfficeLocation => &["office", "oficina"],
    };
    let lower = text.to_lowercase();
    if placeholders.iter().any(|p| *p == lower) || lower == kind.as_str() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn sip_phone_and_postal_from_free_text() {
        let capture = RawPopupCapture::from_text("SIP:jdoe@x.com\n916704092\nC/ MAYOR, 1 28001 MADRID");
        let fields = extractor().consolidate(&capture);

        assert_eq!(fields.get(FieldKind::SipAddress), Some("sip:jdoe@x.com"));
        assert_eq!(fields.get(FieldKind::WorkPhone), Some("916704092"));
        assert_eq!(
            fields.get(FieldKind::PostalAddress),
            Some("C/ MAYOR, 1 28001 MADRID")
        );
        for kind in [
            FieldKind::SipAddress,
            FieldKind::WorkPhone,
            FieldKind::PostalAddress,
        ] {
            assert_eq!(fields.provenance_of(kind), Provenance::Pattern);
        }
        assert_eq!(fields.get(FieldKind::FullName), None);
        assert_eq!(fields.provenance_of(FieldKind::FullName), Provenance::Absent);
        // the SIP token is not an e-mail
        assert_eq!(fields.get(FieldKind::PersonalEmail), None);
    }

    #[test]
    fn structured_name_beats_missing_text() {
        let capture =
            RawPopupCapture::from_text("jdoe@x.com").with_structured(FieldKind::FullName, "DOE, JANE");
        let fields = extractor().consolidate(&capture);

        assert_eq!(fields.get(FieldKind::FullName), Some("DOE, JANE"));
        assert_eq!(fields.provenance_of(FieldKind::FullName), Provenance::Structured);
        assert_eq!(fields.get(FieldKind::PersonalEmail), Some("jdoe@x.com"));
    }

    #[test]
    fn full_name_equal_to_address_is_kept() {
        let capture =
            RawPopupCapture::from_text("jdoe@x.com").with_structured(FieldKind::FullName, "jdoe@x.com");
        let fields = extractor().consolidate(&capture);
        assert_eq!(fields.get(FieldKind::FullName), Some("jdoe@x.com"));
        assert_eq!(fields.provenance_of(FieldKind::FullName), Provenance::Structured);
        assert_eq!(clean_structured_value(FieldKind::FullName, "jdoe@x.com").as_deref(), Some("jdoe@x.com"));

        // text that is only the address still resolves the e-mail
        let text_only = extractor().consolidate(&RawPopupCapture::from_text("jdoe@x.com"));
        assert_eq!(text_only.get(FieldKind::PersonalEmail), Some("jdoe@x.com"));
    }

    #[test]
    fn structured_dominates_pattern() {
        let capture = RawPopupCapture::from_text("DOE, JANE\n916704092")
            .with_structured(FieldKind::WorkPhone, "+34 600 000 000")
            .with_structured(FieldKind::Company, "   ");
        let fields = extractor().consolidate(&capture);

        assert_eq!(fields.get(FieldKind::WorkPhone), Some("+34 600 000 000"));
        assert_eq!(fields.provenance_of(FieldKind::WorkPhone), Provenance::Structured);
        // blank structured text never counts
        assert_eq!(fields.provenance_of(FieldKind::Company), Provenance::Absent);
        assert_eq!(fields.get(FieldKind::FullName), Some("DOE, JANE"));
    }

    #[test]
    fn empty_text_yields_all_absent() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text("  \n "));
        assert!(fields.is_empty());
        for kind in FieldKind::ALL {
            assert_eq!(fields.provenance_of(kind), Provenance::Absent);
        }
    }

    #[test]
    fn consolidate_is_deterministic() {
        let capture = RawPopupCapture::from_text(
            "GARCIA LOPEZ, MARIA\nmaria.garcia@madrid.org\nTrabajo\n91 670 40 92\nMINISTERIO DE HACIENDA",
        )
        .with_structured(FieldKind::Department, "Sistemas");
        let ex = extractor();
        let a = serde_json::to_string(&ex.consolidate(&capture)).unwrap();
        let b = serde_json::to_string(&ex.consolidate(&capture)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn generic_mailbox_loses_to_personal_address() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text(
            "ASP123@madrid.org\nmaria.garcia@madrid.org",
        ));
        assert_eq!(
            fields.get(FieldKind::PersonalEmail),
            Some("maria.garcia@madrid.org")
        );

        let only_generic = extractor().consolidate(&RawPopupCapture::from_text("AGM456@madrid.org"));
        assert_eq!(
            only_generic.get(FieldKind::PersonalEmail),
            Some("AGM456@madrid.org")
        );
    }

    #[test]
    fn postal_code_city_fallback() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text("28001 MADRID"));
        assert_eq!(fields.get(FieldKind::PostalAddress), Some("28001 MADRID"));
        assert_eq!(fields.get(FieldKind::WorkPhone), None);
    }

    #[test]
    fn phone_is_not_taken_from_postal_line() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text(
            "CALLE ALCALA 123456789 28014 MADRID\n+34 91 670 40 92",
        ));
        assert_eq!(fields.get(FieldKind::WorkPhone), Some("916704092"));
    }

    #[test]
    fn full_name_accepts_compound_surnames() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text(
            "Contacto\nGARCIA LOPEZ, Maria Jose\nmaria@x.es",
        ));
        assert_eq!(
            fields.get(FieldKind::FullName),
            Some("GARCIA LOPEZ, Maria Jose")
        );
    }

    #[test]
    fn labelled_work_info_wins_over_heuristic() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text(
            "DOE, JANE\nDepartamento: Informática\nCONTACTO\nMINISTERIO DE HACIENDA\nSUBDIRECCION GENERAL DE TIC\nEDIFICIO A PLANTA 3",
        ));
        assert_eq!(fields.get(FieldKind::Department), Some("Informática"));
        assert_eq!(fields.get(FieldKind::Company), Some("MINISTERIO DE HACIENDA"));
        assert_eq!(
            fields.get(FieldKind::OfficeLocation),
            Some("SUBDIRECCION GENERAL DE TIC")
        );
        assert_eq!(fields.get(FieldKind::FullName), Some("DOE, JANE"));
    }

    #[test]
    fn heuristic_assigns_company_department_office_in_order() {
        let fields = extractor().consolidate(&RawPopupCapture::from_text(
            "NOTAS\nMINISTERIO DE HACIENDA\nSUBDIRECCION GENERAL DE TIC\nEDIFICIO A PLANTA 3\nOTRA LINEA",
        ));
        assert_eq!(fields.get(FieldKind::Company), Some("MINISTERIO DE HACIENDA"));
        assert_eq!(
            fields.get(FieldKind::Department),
            Some("SUBDIRECCION GENERAL DE TIC")
        );
        assert_eq!(
            fields.get(FieldKind::OfficeLocation),
            Some("EDIFICIO A PLANTA 3")
        );
    }

    #[test]
    fn clean_structured_strips_schemes_and_placeholders() {
        assert_eq!(
            clean_structured_value(FieldKind::PersonalEmail, "mailto:a@x.com").as_deref(),
            Some("a@x.com")
        );
        assert_eq!(
            clean_structured_value(FieldKind::WorkPhone, " tel:916704092 ").as_deref(),
            Some("916704092")
        );
        assert_eq!(clean_structured_value(FieldKind::FullName, "Name"), None);
        assert_eq!(clean_structured_value(FieldKind::Company, ""), None);
    }
}
