pub mod docbook;
pub mod focus;

pub use docbook::{DirectorySearch, DocbookApp};
pub use focus::{FocusApp, FocusUpdate};
