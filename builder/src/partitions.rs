// Licensed under the Apache-2.0 license

//! Flash partition tables in the comma-separated
//! `name, type, subtype, offset, size, flags` format.

use std::fs;
use std::path::Path;

use log::warn;

use crate::error::{BuildError, Result};
use crate::size::parse_size;

/// One row of the table. Offset and size stay as written and are only parsed
/// when asked for, so rows nobody uses may leave them blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub name: String,
    pub kind: String,
    pub subtype: String,
    pub flags: String,
    line: usize,
    offset: String,
    size: String,
}

impl PartitionEntry {
    /// Line of the table this row was read from, starting at 1.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn offset_text(&self) -> &str {
        &self.offset
    }

    pub fn size_text(&self) -> &str {
        &self.size
    }

    pub fn offset(&self) -> Result<u64> {
        self.number("offset", &self.offset)
    }

    pub fn size(&self) -> Result<u64> {
        self.number("size", &self.size)
    }

    fn number(&self, what: &str, text: &str) -> Result<u64> {
        parse_size(text).map_err(|_| BuildError::MalformedPartitionRow {
            line: self.line,
            reason: format!("invalid {what} {text:?} for partition {:?}", self.name),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(BuildError::io(format!(
            "reading partition table {}",
            path.display()
        )))?;
        Self::parse(&text)
    }

    /// Splits the table into rows. Blank lines and `#` comments are skipped;
    /// a name that appears twice keeps the last row. Offsets and sizes are
    /// not checked here, see [`PartitionTable::require`].
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = PartitionTable::default();
        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            table.insert(parse_row(line_no, trimmed)?);
        }
        Ok(table)
    }

    fn insert(&mut self, entry: PartitionEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == entry.name) {
            warn!(
                "Partition {:?} is defined more than once; using the last definition",
                entry.name
            );
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Looks up a partition that must exist with a valid offset and size.
    pub fn require(&self, name: &str) -> Result<&PartitionEntry> {
        let entry = self
            .get(name)
            .ok_or_else(|| BuildError::PartitionNotFound(name.to_string()))?;
        entry.offset()?;
        entry.size()?;
        Ok(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_row(line: usize, row: &str) -> Result<PartitionEntry> {
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(BuildError::MalformedPartitionRow {
            line,
            reason: format!("expected at least 5 fields, found {}", fields.len()),
        });
    }
    if fields[0].is_empty() {
        return Err(BuildError::MalformedPartitionRow {
            line,
            reason: "empty partition name".to_string(),
        });
    }

    Ok(PartitionEntry {
        name: fields[0].to_string(),
        kind: fields[1].to_string(),
        subtype: fields[2].to_string(),
        flags: fields.get(5..).map(|f| f.join(",")).unwrap_or_default(),
        line,
        offset: fields[3].to_string(),
        size: fields[4].to_string(),
    })
}
