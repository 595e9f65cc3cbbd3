//! Compiler service: the core pipeline plus advisory analysis and storage.

use crate::advisor::SecurityAdvisor;
use crate::error::StoreError;
use crate::store::{PolicyStore, StoredPolicy};
use rpl_core::{compile, CompilationResult, CompileMode, CompileOptions};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Runs compilations. Both collaborators are optional: without an advisor
/// no findings are produced, without a store nothing is persisted.
#[derive(Clone, Default)]
pub struct CompilerService {
    advisor: Option<Arc<dyn SecurityAdvisor>>,
    store: Option<Arc<dyn PolicyStore>>,
}

impl CompilerService {
    pub fn new() -> Self {
        CompilerService::default()
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SecurityAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Compile `source`, then run the advisory and storage steps the mode
    /// calls for on a successful result.
    pub async fn compile(&self, source: &str, options: &CompileOptions) -> CompilationResult {
        let result = compile(source, options);
        self.finish(source, options.mode, result).await
    }

    /// Compile independent sources concurrently on the blocking pool.
    /// Results keep input order.
    pub async fn batch_compile(
        &self,
        sources: Vec<String>,
        options: &CompileOptions,
    ) -> Vec<CompilationResult> {
        let handles: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let options = options.clone();
                tokio::task::spawn_blocking(move || compile(&source, &options))
            })
            .collect();

        let mut results = Vec::with_capacity(sources.len());
        for (source, handle) in sources.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(event = "Compile", phase = "Aborted", error = %e);
                    CompilationResult::aborted(source, format!("Compilation aborted: {}", e))
                }
            };
            results.push(self.finish(source, options.mode, result).await);
        }
        info!(event = "Compile", phase = "Batch", count = results.len());
        results
    }

    async fn finish(
        &self,
        source: &str,
        mode: CompileMode,
        mut result: CompilationResult,
    ) -> CompilationResult {
        if !result.success {
            return result;
        }

        if mode.runs_advisory() {
            if let (Some(advisor), Some(table)) = (&self.advisor, &result.symbol_table) {
                match advisor.analyze(table).await {
                    Ok(findings) => {
                        info!(
                            event = "Advisory",
                            phase = "Completed",
                            policy_id = %result.policy_id,
                            findings = findings.len(),
                        );
                        result.attach_findings(findings);
                    }
                    Err(e) => {
                        warn!(
                            event = "Advisory",
                            phase = "Failed",
                            policy_id = %result.policy_id,
                            error = %e,
                        );
                    }
                }
            }
        }

        if mode == CompileMode::Full {
            if let Some(store) = &self.store {
                if let Err(e) = save(store.as_ref(), source, &result).await {
                    warn!(
                        event = "Store",
                        phase = "Failed",
                        policy_id = %result.policy_id,
                        error = %e,
                    );
                }
            }
        }
        result
    }
}

/// Create, or update when the same source was stored before.
async fn save(
    store: &dyn PolicyStore,
    source: &str,
    result: &CompilationResult,
) -> Result<(), StoreError> {
    let Some(table) = &result.symbol_table else {
        return Ok(());
    };
    let policy = StoredPolicy {
        policy_id: result.policy_id.clone(),
        source: source.to_string(),
        symbol_table: table.clone(),
        artifact: result.generated_artifact.clone(),
        warnings: result.warnings.clone(),
        risk_score: result.risk_score,
        version: 1,
        updated_at: OffsetDateTime::now_utc(),
    };
    match store.create(policy.clone()).await {
        Err(StoreError::AlreadyExists(_)) => {
            let version = store.update(policy).await?;
            info!(event = "Store", phase = "Updated", policy_id = %result.policy_id, version);
            Ok(())
        }
        Err(e) => Err(e),
        Ok(()) => {
            info!(event = "Store", phase = "Created", policy_id = %result.policy_id);
            Ok(())
        }
    }
}
