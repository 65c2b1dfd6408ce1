use super::model::Table;

/// Uploaded datasets keyed by display name, in upload order.
///
/// Re-uploading a name replaces the earlier table but keeps its position in
/// the selection list.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    entries: Vec<(String, Table)>,
    revision: u64,
}

impl DatasetRegistry {
    /// Insert or replace a dataset. Returns `true` when a dataset of the
    /// same name was replaced.
    pub fn insert(&mut self, name: String, table: Table) -> bool {
        self.revision += 1;
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                entry.1 = table;
                true
            }
            None => {
                self.entries.push((name, table));
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, table)| table)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn first_name(&self) -> Option<&str> {
        self.names().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every insert; derived results keyed on it go stale when a
    /// dataset is replaced.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
