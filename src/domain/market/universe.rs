use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Instruments named by a computation request.
///
/// A raw universe comes straight from a collaborator and may contain
/// duplicates or blanks; a filtered list has already been normalised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentSelection {
    Universe(Vec<String>),
    Filtered(FilteredInstruments),
}

/// Normalised instrument list: trimmed, non-empty, unique, sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilteredInstruments(Vec<String>);

impl FilteredInstruments {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl InstrumentSelection {
    /// Converts to the normalised form. Already-filtered input passes through.
    pub fn into_filtered(self) -> FilteredInstruments {
        match self {
            InstrumentSelection::Filtered(filtered) => filtered,
            InstrumentSelection::Universe(raw) => {
                let unique: BTreeSet<String> = raw
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                FilteredInstruments(unique.into_iter().collect())
            }
        }
    }
}

impl From<Vec<String>> for InstrumentSelection {
    fn from(value: Vec<String>) -> Self {
        InstrumentSelection::Universe(value)
    }
}

impl From<Vec<&str>> for InstrumentSelection {
    fn from(value: Vec<&str>) -> Self {
        InstrumentSelection::Universe(value.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_is_normalised() {
        let selection = InstrumentSelection::from(vec![" TCS", "INFY", "", "TCS", "  "]);
        let filtered = selection.into_filtered();
        assert_eq!(filtered.as_slice(), &["INFY".to_string(), "TCS".to_string()]);
    }

    #[test]
    fn test_filtered_passes_through() {
        let filtered = InstrumentSelection::from(vec!["B", "A"]).into_filtered();
        let again = InstrumentSelection::Filtered(filtered.clone()).into_filtered();
        assert_eq!(again, filtered);
    }
}
