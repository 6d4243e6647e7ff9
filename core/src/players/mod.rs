pub mod process;

pub use process::ProcessPlayer;
