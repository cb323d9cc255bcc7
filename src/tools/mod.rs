//! 工具箱：注册表、执行器、本地工具（file_read / test_run）与 MCP 远程工具代理

pub mod executor;
pub mod file_read;
pub mod registry;
pub mod remote;
pub mod test_run;

pub use executor::ToolExecutor;
pub use file_read::FileReadTool;
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use remote::{register_remote_tools, RemoteTool};
pub use test_run::TestRunTool;
