//! torch 相关封装

pub mod tensor;
