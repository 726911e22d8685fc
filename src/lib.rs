//! Hybrid Element Retriever: resolves a natural-language element description against
//! a live page into a verified locator, backed by an embedding shortlist, a lexical
//! reranker, and a promotion cache of locators that have worked before.
//!
//! The legacy compact-snapshot pipeline (`dom`, `pipeline`, `extract`, `serialize`,
//! `hints`) remains as the `snapshot` CLI subcommand's backend.

pub mod browser;
pub mod cdp;
pub mod config;
pub mod delta;
pub mod dom;
pub mod driver;
pub mod embed;
pub mod error;
pub mod extract;
pub mod hashutil;
pub mod hints;
pub mod locator;
pub mod model;
pub mod mutation;
pub mod orchestrator;
pub mod pipeline;
pub mod promotion;
pub mod ranker;
pub mod rerank;
pub mod serialize;
pub mod snapshotter;
pub mod snippet;
pub mod stability;
pub mod verify;
