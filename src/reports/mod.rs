// Report export formats

pub mod export;

pub use export::{export_filename, render_csv, ExportFormat};
