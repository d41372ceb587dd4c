pub mod base;
pub mod files;
pub mod openai;
pub mod sse;
pub mod utils;

#[cfg(test)]
pub mod mock;
