//! # Integration Flows

pub mod flows;
