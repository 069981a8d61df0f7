// Audit module - 审计模块
// 规则求值与按组运行

pub mod evaluator;
pub mod runner;
