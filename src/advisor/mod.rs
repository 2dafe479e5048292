//! 决策服务层：客户端抽象与实现（Claude API / Mock）

pub mod claude;
pub mod mock;
pub mod traits;

pub use claude::{extract_civ_info, extract_json_from_response, ClaudeAdvisor};
pub use mock::MockAdvisor;
pub use traits::{AdvisorClient, ServiceError};
