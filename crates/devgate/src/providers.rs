pub mod base;
pub mod configs;
pub mod openai;
pub mod search;
pub mod transcription;
pub mod utils;

#[cfg(test)]
pub mod mock;
