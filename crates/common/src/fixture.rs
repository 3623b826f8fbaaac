//! Fixture data model and fixture tables
//!
//! A fixture is one literal claim about the target translator: typing
//! `input` must produce exactly `expected_output`. Tables are parsed from
//! YAML, validated once, and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FixtureError, Result};

const BUILTIN_TABLE: &str = include_str!("../fixtures/swift-translator.yaml");

/// Rough length bucket of a fixture input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SizeClass {
    #[default]
    S,
    M,
    L,
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeClass::S => write!(f, "S"),
            SizeClass::M => write!(f, "M"),
            SizeClass::L => write!(f, "L"),
        }
    }
}

/// How the input text reaches the target's text box
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryMode {
    /// Whole input set in one operation
    #[default]
    Bulk,

    /// Typed key by key: first `partial_input`, then the rest of the input
    Incremental { partial_input: String },
}

/// One literal (input, expected output, metadata) test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Unique identifier, e.g. `Pos_Fun_001`
    pub id: String,

    /// Human-readable description
    pub name: String,

    /// Text entered into the translator
    pub input: String,

    /// Exact text the translator must produce
    pub expected_output: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub size_class: SizeClass,

    #[serde(default)]
    pub entry: EntryMode,
}

impl Fixture {
    /// Create a bulk-entry fixture with no metadata
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            category: String::new(),
            tags: BTreeSet::new(),
            size_class: SizeClass::default(),
            entry: EntryMode::Bulk,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_size_class(mut self, size_class: SizeClass) -> Self {
        self.size_class = size_class;
        self
    }

    /// Switch to incremental typing with the given partial prefix
    pub fn incremental(mut self, partial_input: impl Into<String>) -> Self {
        self.entry = EntryMode::Incremental {
            partial_input: partial_input.into(),
        };
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Split the input into (partial prefix, remaining suffix) for incremental
    /// fixtures. `None` for bulk fixtures.
    pub fn incremental_split(&self) -> Option<(&str, &str)> {
        match &self.entry {
            EntryMode::Bulk => None,
            EntryMode::Incremental { partial_input } => self
                .input
                .strip_prefix(partial_input.as_str())
                .map(|rest| (partial_input.as_str(), rest)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FixtureError::EmptyId(self.name.clone()));
        }

        if let EntryMode::Incremental { partial_input } = &self.entry {
            let valid = !partial_input.is_empty()
                && partial_input.len() < self.input.len()
                && self.input.starts_with(partial_input.as_str());
            if !valid {
                return Err(FixtureError::InvalidPartialInput {
                    id: self.id.clone(),
                    partial: partial_input.clone(),
                    input: self.input.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FixtureTable {
    fixtures: Vec<Fixture>,
}

/// Validated, ordered, immutable collection of fixtures
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    fixtures: Arc<[Fixture]>,
}

impl FixtureSet {
    /// Validate and wrap a list of fixtures
    pub fn new(fixtures: Vec<Fixture>) -> Result<Self> {
        let mut seen = HashSet::new();
        for fixture in &fixtures {
            fixture.validate()?;
            if !seen.insert(fixture.id.as_str()) {
                return Err(FixtureError::DuplicateId(fixture.id.clone()));
            }
        }

        Ok(Self {
            fixtures: fixtures.into(),
        })
    }

    /// Parse a fixture table from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: FixtureTable = serde_yaml::from_str(yaml)?;
        Self::new(table.fixtures)
    }

    /// Parse a fixture table from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load every `*.yaml` / `*.yml` table under a directory, in path order
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut fixtures = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading fixture table {}", entry.path().display());
            let content = std::fs::read_to_string(entry.path())?;
            let table: FixtureTable = serde_yaml::from_str(&content)?;
            fixtures.extend(table.fixtures);
        }

        Self::new(fixtures)
    }

    /// Load a file or a directory of tables
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    /// The Singlish-to-Sinhala table shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_TABLE)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter()
    }

    pub fn as_slice(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn find(&self, id: &str) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.id == id)
    }

    /// Subset containing only the fixture with this id
    pub fn select_id(&self, id: &str) -> Result<Self> {
        let fixture = self
            .find(id)
            .cloned()
            .ok_or_else(|| FixtureError::NotFound(id.to_string()))?;
        Ok(Self {
            fixtures: vec![fixture].into(),
        })
    }

    /// Subset of fixtures carrying a tag, order preserved
    pub fn with_tag(&self, tag: &str) -> Self {
        self.filter(|f| f.has_tag(tag))
    }

    /// Subset of fixtures in a category, order preserved
    pub fn in_category(&self, category: &str) -> Self {
        self.filter(|f| f.category == category)
    }

    fn filter(&self, pred: impl Fn(&Fixture) -> bool) -> Self {
        Self {
            fixtures: self.fixtures.iter().filter(|f| pred(f)).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FixtureSet {
    type Item = &'a Fixture;
    type IntoIter = std::slice::Iter<'a, Fixture>;

    fn into_iter(self) -> Self::IntoIter {
        self.fixtures.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_table() {
        let yaml = r#"
fixtures:
  - id: Pos_Fun_001
    name: Simple present tense statement
    input: "mama iskoolee inne"
    expected_output: "මම ඉස්කෝලේ ඉන්නේ"
    category: Daily language usage
    size_class: S
    tags: [positive]
  - id: Pos_UI_001
    name: Real-time typing
    input: "mama kaeema kannavaa"
    expected_output: "මම කෑම කන්නවා"
    entry:
      mode: incremental
      partial_input: "mama kae"
"#;
        let set = FixtureSet::from_yaml(yaml).unwrap();
        assert_eq!(set.len(), 2);

        let first = set.find("Pos_Fun_001").unwrap();
        assert_eq!(first.entry, EntryMode::Bulk);
        assert!(first.has_tag("positive"));

        let ui = set.find("Pos_UI_001").unwrap();
        assert_eq!(ui.incremental_split(), Some(("mama kae", "ema kannavaa")));
        assert_eq!(ui.size_class, SizeClass::S);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let fixtures = vec![
            Fixture::new("A", "one", "a", "අ"),
            Fixture::new("A", "two", "b", "බ"),
        ];
        assert!(matches!(
            FixtureSet::new(fixtures),
            Err(FixtureError::DuplicateId(id)) if id == "A"
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let fixtures = vec![Fixture::new("  ", "blank", "a", "අ")];
        assert!(matches!(FixtureSet::new(fixtures), Err(FixtureError::EmptyId(_))));
    }

    #[test_case("" ; "empty prefix")]
    #[test_case("mama kaeema kannavaa" ; "whole input")]
    #[test_case("oyaa" ; "not a prefix")]
    fn test_invalid_partial_input(partial: &str) {
        let fixture = Fixture::new("UI", "typing", "mama kaeema kannavaa", "මම කෑම කන්නවා")
            .incremental(partial);
        assert!(matches!(
            FixtureSet::new(vec![fixture]),
            Err(FixtureError::InvalidPartialInput { .. })
        ));
    }

    #[test]
    fn test_whitespace_survives_parsing() {
        let yaml = r#"
fixtures:
  - id: Neg_Fun_004
    name: Line break
    input: "mama heta gedhara naa \n enna epaa"
    expected_output: "මම හෙට ගෙදර නා \nඑන්න එපා"
  - id: Neg_Fun_009
    name: Spaces
    input: "oyaa    kohedha    innee"
    expected_output: "ඔයා    කොහෙද    ඉන්නේ"
"#;
        let set = FixtureSet::from_yaml(yaml).unwrap();
        assert_eq!(set.find("Neg_Fun_004").unwrap().expected_output, "මම හෙට ගෙදර නා \nඑන්න එපා");
        assert_eq!(set.find("Neg_Fun_009").unwrap().input, "oyaa    kohedha    innee");
    }

    #[test]
    fn test_builtin_table() {
        let set = FixtureSet::builtin().unwrap();
        assert_eq!(set.len(), 35);
        assert_eq!(set.with_tag("positive").len(), 24);
        assert_eq!(set.with_tag("negative").len(), 10);

        let ui = set.with_tag("ui");
        assert_eq!(ui.len(), 1);
        assert!(ui.iter().all(|f| f.incremental_split().is_some()));

        let currency = set.find("Pos_Fun_023").unwrap();
        assert_eq!(currency.input, "mata Rs. 1000k oonee");
        assert_eq!(currency.expected_output, "මට Rs. 1000ක් ඕනේ");

        let joined = set.find("Neg_Fun_001").unwrap();
        assert_eq!(joined.expected_output, "මමගෙදරයන්වා");
    }

    #[test]
    fn test_select_and_filter() {
        let set = FixtureSet::builtin().unwrap();

        let one = set.select_id("Neg_Fun_004").unwrap();
        assert_eq!(one.len(), 1);
        assert!(matches!(set.select_id("nope"), Err(FixtureError::NotFound(_))));

        let formatting = set.in_category("Formatting (spaces / line breaks / paragraph)");
        let ids: Vec<&str> = formatting.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["Neg_Fun_003", "Neg_Fun_004"]);
    }

    #[test]
    fn test_load_dir_merges_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "fixtures:\n  - {id: B1, name: b, input: b, expected_output: බ}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "fixtures:\n  - {id: A1, name: a, input: a, expected_output: අ}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = FixtureSet::load(dir.path()).unwrap();
        let ids: Vec<&str> = set.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B1"]);
    }
}
