//! Prod2Vec user/product embeddings with a counterfactual penalty that
//! ties control-arm product embeddings to their treatment counterparts.
//!
//! The usual entry point is [`ml::trainer::Prod2VecTrainer`]: build it
//! from a [`ml::model::Prod2VecConfig`], feed it batches of
//! [`domain::interaction::Interaction`]s, and score with the
//! [`ml::inferencer::Prod2VecScorer`] it hands back.

pub mod application;
pub mod domain;
pub mod infra;
pub mod ml;
