//! Column naming resolved from the SideEye column configuration.
//!
//! The JSON document lists output sections whose entries map a logical field
//! to a header and an optional `exclude` flag:
//!
//! ```json
//! {
//!   "wide_format": false,
//!   "trial_output": { "filename": { "header": "subject" } },
//!   "region_output": { "item_id": { "header": "item" }, "region": { "exclude": true } }
//! }
//! ```
//!
//! Entry order is significant: it is the column order of the measures table.

use crate::config::ConfigError;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One entry of an output or measure section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ColumnSetting {
    /// Header written by SideEye. Measure entries usually omit it.
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub exclude: bool,
}

/// Entries of a section, in document order.
pub type Section = Vec<(String, ColumnSetting)>;

/// The parts of the SideEye configuration that shape the measures table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub wide_format: bool,
    #[serde(default, deserialize_with = "ordered_section")]
    pub trial_output: Section,
    #[serde(default, deserialize_with = "ordered_section")]
    pub region_output: Section,
    #[serde(default, deserialize_with = "ordered_section")]
    pub trial_measures: Section,
    #[serde(default, deserialize_with = "ordered_section")]
    pub region_measures: Section,
}

impl ColumnConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ColumnConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn ordered_section<'de, D>(deserializer: D) -> Result<Section, D::Error>
where
    D: Deserializer<'de>,
{
    struct SectionVisitor;

    impl<'de> Visitor<'de> for SectionVisitor {
        type Value = Section;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of column names to settings")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Section, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, setting)) = map.next_entry::<String, ColumnSetting>()? {
                if entries.iter().any(|(n, _): &(String, ColumnSetting)| *n == name) {
                    return Err(de::Error::custom(format!("duplicate column '{name}'")));
                }
                entries.push((name, setting));
            }
            Ok(entries)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Section, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(SectionVisitor)
}

/// The logical fields the pipeline joins on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    Filename,
    ItemId,
    ItemCondition,
}

impl LogicalField {
    pub const ALL: [LogicalField; 3] = [
        LogicalField::Filename,
        LogicalField::ItemId,
        LogicalField::ItemCondition,
    ];

    /// Key of the field in the column configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalField::Filename => "filename",
            LogicalField::ItemId => "item_id",
            LogicalField::ItemCondition => "item_condition",
        }
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of looking a logical field up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup<'a> {
    /// The field is written to the measures table under this header.
    Present(&'a str),
    /// The field is excluded or never configured; `fallback` is the name to
    /// use when a header is still needed.
    Absent { fallback: &'a str },
}

impl<'a> FieldLookup<'a> {
    /// The header to use regardless of presence.
    pub fn header(self) -> &'a str {
        match self {
            FieldLookup::Present(h) | FieldLookup::Absent { fallback: h } => h,
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, FieldLookup::Present(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedField {
    header: String,
    included: bool,
}

/// Resolved headers for the logical fields plus the included columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    filename: ResolvedField,
    item_id: ResolvedField,
    item_condition: ResolvedField,
    included: Vec<String>,
}

impl Default for FieldMap {
    /// Every field absent, nothing included.
    fn default() -> Self {
        Self::resolve(&ColumnConfig::default())
    }
}

impl FieldMap {
    /// Resolves headers and the included column list.
    ///
    /// Excluded entries are dropped first. A field configured at both levels
    /// takes the trial-level header.
    pub fn resolve(config: &ColumnConfig) -> Self {
        let trial = included_entries(&config.trial_output);
        let region = included_entries(&config.region_output);

        let mut included: Vec<String> = Vec::new();
        for &(name, header) in &region {
            let header = find(&trial, name).unwrap_or(header);
            push_unique(&mut included, header);
        }
        for &(_, header) in &trial {
            push_unique(&mut included, header);
        }
        if config.wide_format {
            for (name, _) in included_entries(&config.region_measures) {
                push_unique(&mut included, name);
            }
            for (name, _) in included_entries(&config.trial_measures) {
                push_unique(&mut included, name);
            }
        }

        let field = |logical: LogicalField| {
            let key = logical.as_str();
            match find(&trial, key).or_else(|| find(&region, key)) {
                Some(header) => ResolvedField {
                    header: header.to_string(),
                    included: true,
                },
                None => ResolvedField {
                    header: key.to_string(),
                    included: false,
                },
            }
        };

        let map = Self {
            filename: field(LogicalField::Filename),
            item_id: field(LogicalField::ItemId),
            item_condition: field(LogicalField::ItemCondition),
            included,
        };
        debug!(
            filename = %map.header(LogicalField::Filename),
            item_id = %map.header(LogicalField::ItemId),
            item_condition = %map.header(LogicalField::ItemCondition),
            columns = map.included.len(),
            "Resolved column configuration"
        );
        map
    }

    /// Reads the column configuration and resolves it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ColumnConfig::from_file(path).map(|config| Self::resolve(&config))
    }

    pub fn lookup(&self, field: LogicalField) -> FieldLookup<'_> {
        let resolved = self.resolved(field);
        if resolved.included {
            FieldLookup::Present(&resolved.header)
        } else {
            FieldLookup::Absent {
                fallback: &resolved.header,
            }
        }
    }

    /// Header for `field`, falling back to its literal name.
    pub fn header(&self, field: LogicalField) -> &str {
        &self.resolved(field).header
    }

    pub fn is_included(&self, field: LogicalField) -> bool {
        self.resolved(field).included
    }

    /// Columns of the measures table, in output order.
    pub fn included_columns(&self) -> &[String] {
        &self.included
    }

    fn resolved(&self, field: LogicalField) -> &ResolvedField {
        match field {
            LogicalField::Filename => &self.filename,
            LogicalField::ItemId => &self.item_id,
            LogicalField::ItemCondition => &self.item_condition,
        }
    }
}

/// `(name, header)` of the entries not excluded.
fn included_entries(section: &Section) -> Vec<(&str, &str)> {
    section
        .iter()
        .filter(|(_, setting)| !setting.exclude)
        .map(|(name, setting)| (name.as_str(), setting.header.as_deref().unwrap_or(name)))
        .collect()
}

fn find<'a>(entries: &[(&str, &'a str)], name: &str) -> Option<&'a str> {
    entries.iter().find(|(n, _)| *n == name).map(|(_, h)| *h)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
