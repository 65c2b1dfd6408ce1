use serde::Deserialize;

use crate::config::AppConfig;
use crate::data::chart::{ChartData, ChartError, ChartKind, ChartRequest};
use crate::data::loader::{self, LoadFailure, LoadOptions, Upload};
use crate::data::model::{Table, TableError};
use crate::data::olap::{AggFunc, OlapError, OlapOutput, OlapRequest};
use crate::data::registry::DatasetRegistry;
use crate::session_log::SessionLog;

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    #[default]
    Home,
    Visualization,
    Analysis,
    Operations,
    Log,
}

impl Page {
    pub const ALL: [Page; 5] = [
        Page::Home,
        Page::Visualization,
        Page::Analysis,
        Page::Operations,
        Page::Log,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Visualization => "Data Visualization",
            Page::Analysis => "Data Analysis",
            Page::Operations => "Data Operations",
            Page::Log => "Log Page",
        }
    }
}

// ---------------------------------------------------------------------------
// Memoised derived results
// ---------------------------------------------------------------------------

/// Identifies a derived result: dataset name, registry revision, request.
pub type ResultKey<R> = (String, u64, R);

/// Holds the most recent result so it is computed once per change rather
/// than once per frame.
#[derive(Debug)]
pub struct Memo<K, V> {
    slot: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        let entry = match self.slot.take() {
            Some((k, v)) if k == key => (k, v),
            _ => {
                let value = compute();
                (key, value)
            }
        };
        &self.slot.insert(entry).1
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

// ---------------------------------------------------------------------------
// Per-page widget state
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VizPanel {
    pub kind: ChartKind,
    pub column: Option<String>,
    /// Second axis, used by scatter plots only.
    pub second: Option<String>,
    pub cache: Memo<ResultKey<ChartRequest>, Result<ChartData, ChartError>>,
}

impl Default for VizPanel {
    fn default() -> Self {
        Self {
            kind: ChartKind::Line,
            column: None,
            second: None,
            cache: Memo::default(),
        }
    }
}

impl VizPanel {
    pub fn request(&self) -> Option<ChartRequest> {
        let column = self.column.clone()?;
        Some(match self.kind {
            ChartKind::Line => ChartRequest::Line { column },
            ChartKind::Bar => ChartRequest::Bar { column },
            ChartKind::Scatter => ChartRequest::Scatter {
                x: column,
                y: self.second.clone()?,
            },
        })
    }

    fn clear_columns(&mut self) {
        self.column = None;
        self.second = None;
        self.cache.clear();
    }
}

#[derive(Debug, Default)]
pub struct AnalysisPanel {
    /// Chosen columns in the order they were picked.
    pub columns: Vec<String>,
    pub cache: Memo<ResultKey<Vec<String>>, Result<Table, TableError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OlapKind {
    GroupBy,
    Aggregate,
    Slice,
    Pivot,
}

impl OlapKind {
    pub const ALL: [OlapKind; 4] = [
        OlapKind::GroupBy,
        OlapKind::Aggregate,
        OlapKind::Slice,
        OlapKind::Pivot,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OlapKind::GroupBy => "Group By",
            OlapKind::Aggregate => "Aggregate",
            OlapKind::Slice => "Slice and Dice",
            OlapKind::Pivot => "Pivot",
        }
    }
}

#[derive(Debug)]
pub struct OlapPanel {
    pub kind: OlapKind,
    pub group_columns: Vec<String>,
    pub func: AggFunc,
    pub slice_column: Option<String>,
    pub slice_value: String,
    pub pivot_index: Option<String>,
    pub pivot_columns: Vec<String>,
    pub pivot_values: Option<String>,
    pub cache: Memo<ResultKey<OlapRequest>, Result<OlapOutput, OlapError>>,
}

impl Default for OlapPanel {
    fn default() -> Self {
        Self {
            kind: OlapKind::GroupBy,
            group_columns: Vec::new(),
            func: AggFunc::Mean,
            slice_column: None,
            slice_value: String::new(),
            pivot_index: None,
            pivot_columns: Vec::new(),
            pivot_values: None,
            cache: Memo::default(),
        }
    }
}

impl OlapPanel {
    /// The request described by the current widgets, or `None` while a
    /// required choice is still missing.
    pub fn request(&self) -> Option<OlapRequest> {
        match self.kind {
            OlapKind::GroupBy if self.group_columns.is_empty() => None,
            OlapKind::GroupBy => Some(OlapRequest::GroupBy {
                columns: self.group_columns.clone(),
            }),
            OlapKind::Aggregate => Some(OlapRequest::Aggregate { func: self.func }),
            OlapKind::Slice => Some(OlapRequest::Slice {
                column: self.slice_column.clone()?,
                value: self.slice_value.clone(),
            }),
            OlapKind::Pivot => Some(OlapRequest::Pivot {
                index: self.pivot_index.clone()?,
                columns: self.pivot_columns.clone(),
                values: self.pivot_values.clone()?,
            }),
        }
    }

    fn clear_columns(&mut self) {
        self.group_columns.clear();
        self.slice_column = None;
        self.slice_value.clear();
        self.pivot_index = None;
        self.pivot_columns.clear();
        self.pivot_values = None;
        self.cache.clear();
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The whole session, independent of rendering. Owned by the app and passed
/// by reference into every page.
#[derive(Debug)]
pub struct AppState {
    pub registry: DatasetRegistry,
    pub log: SessionLog,

    /// Name of the current dataset; always a registry key once anything
    /// has been uploaded.
    pub selected: Option<String>,
    pub page: Page,

    /// Load errors waiting to be dismissed.
    pub errors: Vec<LoadFailure>,
    pub load_options: LoadOptions,

    pub viz: VizPanel,
    pub analysis: AnalysisPanel,
    pub olap: OlapPanel,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            registry: DatasetRegistry::default(),
            log: SessionLog::default(),
            selected: None,
            page: config.start_page,
            errors: Vec::new(),
            load_options: config.load_options(),
            viz: VizPanel::default(),
            analysis: AnalysisPanel::default(),
            olap: OlapPanel::default(),
        }
    }

    /// Load a batch of uploads into the registry.
    pub fn ingest(&mut self, uploads: Vec<Upload>) {
        let report = loader::load_batch(uploads, &self.load_options, &mut self.log);

        let mut current_replaced = false;
        for (name, table) in report.loaded {
            let is_current = self.selected.as_deref() == Some(name.as_str());
            if self.registry.insert(name, table) && is_current {
                current_replaced = true;
            }
        }
        self.errors.extend(report.failures);

        if current_replaced {
            self.reset_panels();
        }
        self.ensure_selection();
    }

    /// Record a file that could not even be read from disk.
    pub fn report_unreadable(&mut self, name: &str, err: &anyhow::Error) {
        let failure = loader::record_failure(&mut self.log, name, err);
        self.errors.push(failure);
    }

    pub fn select_dataset(&mut self, name: &str) {
        if !self.registry.contains(name) || self.selected.as_deref() == Some(name) {
            return;
        }
        log::debug!("Selected dataset '{name}'");
        self.selected = Some(name.to_string());
        self.reset_panels();
    }

    /// The selected dataset and its table.
    pub fn current(&self) -> Option<(&str, &Table)> {
        let name = self.selected.as_deref()?;
        self.registry.get(name).map(|table| (name, table))
    }

    pub fn dismiss_errors(&mut self) {
        self.errors.clear();
    }

    /// Point the selection at the first dataset when it is unset or stale.
    fn ensure_selection(&mut self) {
        let valid = self
            .selected
            .as_deref()
            .is_some_and(|name| self.registry.contains(name));
        if !valid {
            self.selected = self.registry.first_name().map(str::to_string);
            self.reset_panels();
        }
    }

    /// Column choices refer to the previous table; forget them.
    fn reset_panels(&mut self) {
        self.viz.clear_columns();
        self.analysis = AnalysisPanel::default();
        self.olap.clear_columns();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn ingest_selects_first_dataset_and_keeps_selection() {
        let mut state = AppState::default();
        state.ingest(vec![
            Upload::new("one.csv", "a\n1\n"),
            Upload::new("two.csv", "b\n2\n"),
        ]);
        assert_eq!(state.selected.as_deref(), Some("one.csv"));

        state.select_dataset("two.csv");
        state.ingest(vec![Upload::new("three.csv", "c\n3\n")]);
        assert_eq!(state.selected.as_deref(), Some("two.csv"));
        assert_eq!(state.registry.len(), 3);
        assert_eq!(state.current().map(|(_, t)| t.shape()), Some((1, 1)));
    }

    #[test]
    fn failed_upload_is_logged_and_reported() {
        let mut state = AppState::default();
        state.ingest(vec![Upload::new("broken.xlsx", "not a workbook")]);

        assert!(state.registry.is_empty());
        assert_eq!(state.selected, None);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].name, "broken.xlsx");
        assert!(state.errors[0].message.contains("broken.xlsx"));
        assert_eq!(state.log.len(), 1);

        state.dismiss_errors();
        assert!(state.errors.is_empty());
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn reuploading_current_dataset_resets_column_choices() {
        let mut state = AppState::default();
        state.ingest(vec![Upload::new("d.csv", "a\n1\n")]);
        state.analysis.columns = vec!["a".into()];
        state.olap.group_columns = vec!["a".into()];

        state.ingest(vec![Upload::new("d.csv", "z\n1\n")]);
        assert!(state.analysis.columns.is_empty());
        assert!(state.olap.group_columns.is_empty());
        assert_eq!(state.registry.len(), 1);
    }

    #[test]
    fn selecting_unknown_dataset_is_ignored() {
        let mut state = AppState::default();
        state.ingest(vec![Upload::new("d.csv", "a\n1\n")]);
        state.select_dataset("missing.csv");
        assert_eq!(state.selected.as_deref(), Some("d.csv"));
    }

    #[test]
    fn requests_wait_for_required_choices() {
        let mut olap = OlapPanel::default();
        assert_eq!(olap.request(), None);
        olap.group_columns.push("a".into());
        assert_eq!(
            olap.request(),
            Some(OlapRequest::GroupBy {
                columns: vec!["a".into()]
            })
        );

        let mut viz = VizPanel {
            kind: ChartKind::Scatter,
            column: Some("x".into()),
            ..VizPanel::default()
        };
        assert_eq!(viz.request(), None);
        viz.second = Some("y".into());
        assert_eq!(
            viz.request(),
            Some(ChartRequest::Scatter {
                x: "x".into(),
                y: "y".into()
            })
        );
    }

    #[test]
    fn memo_recomputes_only_on_new_key() {
        let calls = Cell::new(0);
        let mut memo: Memo<u32, u32> = Memo::default();
        let compute = |k: u32| {
            calls.set(calls.get() + 1);
            k * 10
        };
        assert_eq!(*memo.get_or_compute(1, || compute(1)), 10);
        assert_eq!(*memo.get_or_compute(1, || compute(1)), 10);
        assert_eq!(*memo.get_or_compute(2, || compute(2)), 20);
        assert_eq!(calls.get(), 2);
    }
}
