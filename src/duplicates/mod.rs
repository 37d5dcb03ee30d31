mod scanner;

// Re-export from scanner
pub use scanner::{
    make_search_term, scan_for_duplicates, DuplicateEntry, DuplicateGroup, DuplicateReport,
};
