pub mod roster_loader;

pub use roster_loader::{discover_submissions, load_roster};
