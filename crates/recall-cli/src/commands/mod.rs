pub mod init;
pub mod memory;
pub mod stats;

pub use init::InitCommand;
pub use memory::MemoryCommand;
pub use stats::StatsCommand;
