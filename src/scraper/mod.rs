pub mod engine;
pub mod mapper;
pub mod pagination;
pub mod path;
pub mod persist;
pub mod registry;
pub mod runner;
pub mod search;
pub mod template;
