//! Presentation of co-occurrence tables: a fixed-width text table for the
//! terminal and a horizontal bar chart saved as SVG.

pub mod plot;
pub mod table;

pub use plot::{plot_file_name, render_bar_chart, save_plot};
pub use table::render_table;
