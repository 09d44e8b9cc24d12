//! Third-party login providers

pub mod wechat;
