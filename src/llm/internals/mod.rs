//! Internal plumbing for the LLM backend: retry/backoff and response parsing.

pub mod retry;
