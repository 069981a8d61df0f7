// Rules module - 规则系统
// 规则目录、版本上下文与规则文件加载

pub mod catalog;
pub mod loader;
pub mod model;
pub mod version;
