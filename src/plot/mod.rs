//! Terminal plotting.

pub mod ascii;

pub use ascii::render_column_plot;
