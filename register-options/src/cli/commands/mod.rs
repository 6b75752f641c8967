pub mod settings;

pub use settings::{OptionsSession, run};
