//! Shared in-memory inputs for the integration tests.

use treedraw_core::memory::{MemoryOpener, MemoryTree};

/// One file, `events.mem`, holding a single `events` tree with `px` and `py`.
pub fn single_tree(rows: &[(f64, f64)]) -> MemoryOpener {
    MemoryOpener::new().with_file(
        "events.mem",
        [MemoryTree::new("events", ["px", "py"])
            .with_rows(rows.iter().map(|&(px, py)| [Some(px), Some(py)]))],
    )
}

/// One file, `two.mem`, holding the trees `events` and `runs`.
pub fn two_trees() -> MemoryOpener {
    MemoryOpener::new().with_file(
        "two.mem",
        [
            MemoryTree::new("events", ["px"]).with_rows([[Some(1.0)], [Some(2.0)]]),
            MemoryTree::new("runs", ["lumi"]).with_rows([[Some(0.5)]]),
        ],
    )
}
