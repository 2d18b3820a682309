//! Index Usage Inspector.
//!
//! Runs a `queryPlanner` explain for an operation before it executes and
//! warns when the winning plan scans the whole collection. The check is
//! advisory: neither a collection scan nor a failing explain affects the
//! operation itself.

use crate::db::{DriverResult, Namespace};
use crate::error::{DbError, DbResult};
use crate::logging::{CompositeLogger, LogId};
use crate::tools::pipeline::OperationKind;
use mongodb::bson::{Bson, Document, doc};
use std::future::Future;
use std::sync::Arc;

const CONTEXT: &str = "index-check";

/// Stages that read through an index.
const INDEX_STAGES: &[&str] = &[
    "IXSCAN",
    "EXPRESS_IXSCAN",
    "IDHACK",
    "EXPRESS_IDHACK",
    "EXPRESS_CLUSTERED_IXSCAN",
    "CLUSTERED_IXSCAN",
    "COUNT_SCAN",
    "DISTINCT_SCAN",
    "AND_HASH",
    "AND_SORTED",
    "GEO_NEAR_2D",
    "GEO_NEAR_2DSPHERE",
    "TEXT_MATCH",
];

const COLLECTION_SCAN: &str = "COLLSCAN";

/// Child links followed when walking a plan tree.
const CHILD_KEYS: &[&str] = &["inputStage", "inputStages", "outerStage", "innerStage"];

/// Wrap a command so the server only plans it.
pub fn explain_command(body: Document, verbosity: &str) -> Document {
    doc! { "explain": body, "verbosity": verbosity }
}

/// Outcome of inspecting one explain document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexUsageVerdict {
    pub uses_index: bool,
    pub collection_scan: bool,
    /// Stage names of every winning plan, depth-first.
    pub stages: Vec<String>,
}

impl IndexUsageVerdict {
    /// A collection scan with no index stage anywhere in the winning plan.
    pub fn is_full_scan(&self) -> bool {
        self.collection_scan && !self.uses_index
    }

    pub fn stage_summary(&self) -> String {
        self.stages.join(" -> ")
    }
}

/// Classify the winning plan(s) of an explain document.
pub fn analyze_explain(explain: &Document) -> IndexUsageVerdict {
    let mut plans = Vec::new();
    collect_winning_plans(explain, &mut plans);

    let mut verdict = IndexUsageVerdict::default();
    for plan in plans {
        walk_plan(plan, &mut verdict);
    }
    verdict
}

fn walk_plan(plan: &Document, verdict: &mut IndexUsageVerdict) {
    // Slot-based engine plans carry the classic tree under `queryPlan`.
    let root = plan.get_document("queryPlan").unwrap_or(plan);
    walk_stages(root, verdict);
}

fn collect_winning_plans<'a>(doc: &'a Document, plans: &mut Vec<&'a Document>) {
    for (key, value) in doc {
        match (key.as_str(), value) {
            ("rejectedPlans", _) => {}
            ("winningPlan", Bson::Document(plan)) => plans.push(plan),
            (_, Bson::Document(child)) => collect_winning_plans(child, plans),
            (_, Bson::Array(items)) => {
                for item in items {
                    if let Bson::Document(child) = item {
                        collect_winning_plans(child, plans);
                    }
                }
            }
            _ => {}
        }
    }
}

fn walk_stages(stage: &Document, verdict: &mut IndexUsageVerdict) {
    if let Ok(name) = stage.get_str("stage") {
        if INDEX_STAGES.contains(&name) {
            verdict.uses_index = true;
        }
        if name == COLLECTION_SCAN {
            verdict.collection_scan = true;
        }
        verdict.stages.push(name.to_string());
    }

    for key in CHILD_KEYS {
        match stage.get(*key) {
            Some(Bson::Document(child)) => walk_stages(child, verdict),
            Some(Bson::Array(children)) => {
                for child in children {
                    if let Bson::Document(child) = child {
                        walk_stages(child, verdict);
                    }
                }
            }
            _ => {}
        }
    }

    // Sharded plans nest one winning plan per shard.
    if let Ok(shards) = stage.get_array("shards") {
        for shard in shards {
            if let Some(plan) = shard.as_document().and_then(|s| s.get_document("winningPlan").ok()) {
                walk_plan(plan, verdict);
            }
        }
    }
}

pub struct IndexUsageInspector {
    logger: Arc<CompositeLogger>,
}

impl IndexUsageInspector {
    pub fn new(logger: Arc<CompositeLogger>) -> Self {
        Self { logger }
    }

    /// Obtain an explain document from `explain` and report collection scans.
    ///
    /// Returns `None` when the explain itself failed; that failure is logged
    /// as a warning and otherwise ignored.
    pub async fn check_index_usage<F, Fut>(
        &self,
        namespace: &Namespace,
        kind: OperationKind,
        explain: F,
    ) -> Option<IndexUsageVerdict>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DriverResult<Document>>,
    {
        match self.inspect(namespace, kind, explain).await {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                self.logger
                    .warning(LogId::INDEX_CHECK_FAILED, CONTEXT, e.to_string())
                    .await;
                None
            }
        }
    }

    /// Like [`check_index_usage`](Self::check_index_usage) but hands a failed
    /// explain back as [`DbError::Inspection`].
    pub async fn inspect<F, Fut>(
        &self,
        namespace: &Namespace,
        kind: OperationKind,
        explain: F,
    ) -> DbResult<IndexUsageVerdict>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DriverResult<Document>>,
    {
        let plan = explain().await.map_err(|e| {
            DbError::inspection(format!("{kind} on {namespace} could not run explain: {e}"))
        })?;

        let verdict = analyze_explain(&plan);
        if verdict.is_full_scan() {
            self.logger
                .warning(
                    LogId::INDEX_CHECK_COLLSCAN,
                    CONTEXT,
                    format!(
                        "{kind} on database \"{}\", collection \"{}\" performs a collection scan \
                         ({}). Consider adding an index for this query.",
                        namespace.database,
                        namespace.collection,
                        verdict.stage_summary()
                    ),
                )
                .await;
        }
        Ok(verdict)
    }
}
