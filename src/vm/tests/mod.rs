//! VM 模块测试
//!
//! Loader, scheduler and lifecycle tests share the toy instruction set in
//! `support`.

pub mod support;
