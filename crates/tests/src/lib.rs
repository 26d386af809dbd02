//! Cross-module tests for the vocoder engine

#[cfg(test)]
mod engine_integration;
