use std::collections::BTreeMap;

use tracing::debug;

use crate::error::LineError;
use crate::models::line::{Line, LineEdit};

/// Metadata kept in parallel to the line list, keyed by line index.
///
/// Every structural change to the line list must be mirrored here, otherwise
/// flags end up attached to the wrong line after a delete or a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedMeta<T> {
    entries: BTreeMap<usize, T>,
}

impl<T> Default for IndexedMeta<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> IndexedMeta<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(&index)
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.entries.insert(index, value);
    }

    pub fn clear(&mut self, index: usize) -> Option<T> {
        self.entries.remove(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops the entry at `index` and shifts every entry above it down by one.
    pub fn remove_index(&mut self, index: usize) -> Option<T> {
        let removed = self.entries.remove(&index);
        let above = self.entries.split_off(&index);
        self.entries
            .extend(above.into_iter().map(|(i, v)| (i - 1, v)));
        removed
    }

    /// Opens a gap at `index`, shifting entries at or above it up by one.
    pub fn insert_index(&mut self, index: usize) {
        let above = self.entries.split_off(&index);
        self.entries
            .extend(above.into_iter().map(|(i, v)| (i + 1, v)));
    }

    /// Mirrors moving the line at `from` to position `to`.
    pub fn move_index(&mut self, from: usize, to: usize) {
        let value = self.remove_index(from);
        self.insert_index(to);
        if let Some(value) = value {
            self.entries.insert(to, value);
        }
    }
}

impl<T: Copy> IndexedMeta<T> {
    pub fn get_or(&self, index: usize, default: T) -> T {
        self.entries.get(&index).copied().unwrap_or(default)
    }
}

/// Ordered, editable list of document lines plus the per-line taxability map.
///
/// Lines without an explicit flag are taxable.
#[derive(Debug, Clone, PartialEq)]
pub struct LineCollection {
    lines: Vec<Line>,
    taxable: IndexedMeta<bool>,
    min_lines: usize,
}

impl LineCollection {
    /// Starts a collection with one blank line.
    pub fn new(min_lines: usize) -> Self {
        Self {
            lines: vec![Line::blank()],
            taxable: IndexedMeta::new(),
            min_lines,
        }
    }

    /// Loads persisted lines, seeding the taxability map from each line's flag.
    pub fn from_lines(lines: Vec<Line>, min_lines: usize) -> Self {
        let mut taxable = IndexedMeta::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(flag) = line.taxable {
                taxable.set(i, flag);
            }
        }
        Self {
            lines,
            taxable,
            min_lines,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn taxable_flags(&self) -> &IndexedMeta<bool> {
        &self.taxable
    }

    pub fn is_taxable(&self, index: usize) -> bool {
        self.taxable.get_or(index, true)
    }

    /// Whether the remove control should be offered.
    pub fn can_remove(&self) -> bool {
        self.lines.len() > self.min_lines
    }

    /// Appends `line` and returns its index.
    pub fn append(&mut self, line: Line) -> usize {
        if let Some(flag) = line.taxable {
            self.taxable.set(self.lines.len(), flag);
        }
        self.lines.push(line);
        self.lines.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<Line, LineError> {
        self.check_index(index)?;
        if !self.can_remove() {
            return Err(LineError::LastLine {
                min: self.min_lines,
            });
        }
        let line = self.lines.remove(index);
        self.taxable.remove_index(index);
        debug!("Removed line {} ({} remaining)", index, self.lines.len());
        Ok(line)
    }

    pub fn update(&mut self, index: usize, edit: LineEdit) -> Result<(), LineError> {
        self.check_index(index)?;
        edit.apply(&mut self.lines[index]);
        Ok(())
    }

    pub fn set_taxable(&mut self, index: usize, taxable: bool) -> Result<(), LineError> {
        self.check_index(index)?;
        self.taxable.set(index, taxable);
        Ok(())
    }

    pub fn move_line(&mut self, from: usize, to: usize) -> Result<(), LineError> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        let line = self.lines.remove(from);
        self.lines.insert(to, line);
        self.taxable.move_index(from, to);
        Ok(())
    }

    /// Lines with the live taxability flag written back for persistence.
    pub fn export(&self) -> Vec<Line> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let mut line = line.clone();
                line.taxable = Some(self.is_taxable(i));
                line
            })
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<(), LineError> {
        if index < self.lines.len() {
            Ok(())
        } else {
            Err(LineError::OutOfRange {
                index,
                len: self.lines.len(),
            })
        }
    }
}
