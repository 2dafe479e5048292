//! 意图执行管线
//!
//! - **reorder**：批内依赖重排（消耗/要求契约）
//! - **executor**：按序执行、失败续行、终结停止、跨上下文转发

pub mod executor;
pub mod reorder;

pub use executor::{ActorContext, BatchReport, ExecutionPipeline, RulesEngine};
pub use reorder::reorder;
