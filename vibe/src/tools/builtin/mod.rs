//! Builtin tools
//!
//! One file per tool. `standard_tools` returns the full catalogue the
//! executor registers by default.

mod edit_file;
mod estimate;
mod fetch;
mod git;
mod glob_tool;
mod grep;
mod list_directory;
mod memory;
mod read_file;
mod run_command;
mod search;
mod write_file;

pub use edit_file::EditFileTool;
pub use estimate::EstimateTokensTool;
pub use fetch::FetchTool;
pub use git::{GitDiffTool, GitStatusTool};
pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use memory::{RecallTool, RememberTool, memory_key};
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use search::SearchTool;
pub use write_file::WriteFileTool;

use super::Tool;

/// The full default catalogue
pub fn standard_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ReadFileTool),
        Box::new(WriteFileTool),
        Box::new(EditFileTool),
        Box::new(ListDirectoryTool),
        Box::new(GlobTool),
        Box::new(GrepTool),
        Box::new(RunCommandTool),
        Box::new(GitStatusTool),
        Box::new(GitDiffTool),
        Box::new(FetchTool::new()),
        Box::new(SearchTool),
        Box::new(RememberTool),
        Box::new(RecallTool),
        Box::new(EstimateTokensTool),
    ]
}
