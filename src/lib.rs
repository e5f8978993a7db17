//! JQL 查询引擎
//!
//! 文本查询经过词法分析, 语法分析, 字段解析与语义校验后, 编译为查询计划,
//! 在只读的位图索引上执行并排序. 入口是 [`SearchService`].

pub mod ast;
pub mod complexity;
pub mod config;
pub mod context;
pub mod date;
pub mod directory;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod field;
pub mod fitness;
pub mod functions;
pub mod index;
pub mod lexer;
pub mod literal;
pub mod model;
pub mod operand;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod sample;
pub mod sanitize;
pub mod text;
pub mod token;
pub mod validator;

pub use config::{ConfigError, EngineConfig, FeatureToggles, OptimizationConfig};
pub use directory::{Directory, InMemoryDirectory};
pub use engine::{SearchResponse, SearchResults, SearchService};
pub use error::{JqlError, Message, MessageKind, MessageSet, Result, Severity};
pub use fitness::Fitness;
pub use functions::{FunctionRegistry, JqlFunction};
pub use index::IssueIndex;
pub use validator::{QueryOrigin, ValidatedQuery};
