use crate::normalize::{self, CanonicalLine};

/// Composite group identity. Structured equality is what buckets lines; the
/// joined label is only a human-readable rendering used for override
/// persistence and reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub payer: String,
    pub procedure_code: String,
    pub place_of_service: String,
    pub modifiers: String,
    /// Present only under the units-in-key variant. Toggling that variant
    /// changes every group identity, which orphans stored overrides; that is
    /// accepted behavior, not silently corrected.
    pub units: Option<String>,
}

impl GroupKey {
    pub fn for_line(line: &CanonicalLine, units_in_key: bool) -> GroupKey {
        GroupKey {
            payer: line.payer.clone(),
            procedure_code: line.procedure_code.clone(),
            place_of_service: line.place_of_service.clone(),
            modifiers: line.modifiers.clone(),
            units: units_in_key.then(|| line.units.clone()),
        }
    }

    /// Builds a key from an ad hoc descriptor, applying the same field
    /// normalization the ingest path applies, so lookups match grouped lines.
    pub fn from_descriptor(
        payer: &str,
        procedure_code: &str,
        place_of_service: &str,
        modifiers: &str,
        units: &str,
        units_in_key: bool,
    ) -> GroupKey {
        let units = {
            let trimmed = units.trim();
            if trimmed.is_empty() {
                crate::constants::DEFAULT_UNITS.to_string()
            } else {
                trimmed.to_string()
            }
        };
        GroupKey {
            payer: normalize::normalize_payer(payer),
            procedure_code: procedure_code.trim().to_string(),
            place_of_service: place_of_service.trim().to_string(),
            modifiers: normalize::normalize_modifiers(modifiers),
            units: units_in_key.then_some(units),
        }
    }

    pub fn label(&self) -> String {
        match &self.units {
            Some(units) => format!(
                "{} | {} | {} | {} | {}",
                self.payer, self.procedure_code, self.place_of_service, self.modifiers, units
            ),
            None => format!(
                "{} | {} | {} | {}",
                self.payer, self.procedure_code, self.place_of_service, self.modifiers
            ),
        }
    }
}
